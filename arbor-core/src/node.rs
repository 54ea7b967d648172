// SPDX-License-Identifier: MIT OR Apache-2.0

//! Nodes of the ownership tree: accounts, root spaces and subspaces.
use serde::{Deserialize, Serialize};

use crate::id::{ActorId, LicenseId, NodeId, PolicyId};
use crate::license::BaselineLicensePlan;
use crate::settings::SpaceSettings;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountType {
    #[default]
    User,
    Organization,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDetails {
    pub account_type: AccountType,
    pub baseline_plan: BaselineLicensePlan,

    /// Opaque id at the external subscription provider, if the account has one.
    pub external_subscription_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceDetails {
    /// Account owning the whole space tree.
    pub account_id: NodeId,
    pub settings: SpaceSettings,
}

/// Kind of a node together with its kind-specific payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Account(AccountDetails),
    SpaceRoot(SpaceDetails),
    Subspace(SpaceDetails),
}

/// A node of the ownership tree.
///
/// Relations are plain ids, related records are loaded through
/// [`PolicyStore`](crate::traits::PolicyStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: NodeId,
    pub kind: NodeKind,

    /// Nesting depth, 0 for accounts and root spaces.
    pub level: u8,

    /// Owning account for root spaces, parent space for subspaces, none for accounts.
    pub parent_id: Option<NodeId>,

    /// Ordered child ids: root spaces of an account or subspaces of a space.
    pub children: Vec<NodeId>,

    pub actor_id: ActorId,
    pub authorization_id: PolicyId,
    pub license_id: LicenseId,
}

impl ResourceNode {
    pub fn is_account(&self) -> bool {
        matches!(self.kind, NodeKind::Account(_))
    }

    pub fn account_details(&self) -> Option<&AccountDetails> {
        match &self.kind {
            NodeKind::Account(details) => Some(details),
            _ => None,
        }
    }

    pub fn account_details_mut(&mut self) -> Option<&mut AccountDetails> {
        match &mut self.kind {
            NodeKind::Account(details) => Some(details),
            _ => None,
        }
    }

    pub fn space_details(&self) -> Option<&SpaceDetails> {
        match &self.kind {
            NodeKind::SpaceRoot(details) | NodeKind::Subspace(details) => Some(details),
            NodeKind::Account(_) => None,
        }
    }

    pub fn space_details_mut(&mut self) -> Option<&mut SpaceDetails> {
        match &mut self.kind {
            NodeKind::SpaceRoot(details) | NodeKind::Subspace(details) => Some(details),
            NodeKind::Account(_) => None,
        }
    }

    /// Account owning this node, the node itself for accounts.
    pub fn account_id(&self) -> NodeId {
        match &self.kind {
            NodeKind::Account(_) => self.id,
            NodeKind::SpaceRoot(details) | NodeKind::Subspace(details) => details.account_id,
        }
    }
}
