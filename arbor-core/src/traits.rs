// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces of the collaborators the propagation engine depends on.
use std::error::Error;
use std::fmt::Display;

use crate::credential::{Credential, CredentialCriterion};
use crate::id::{ActorId, NodeId};
use crate::license::{EntitlementType, GrantedEntitlement, License};
use crate::node::ResourceNode;
use crate::policy::AuthorizationPolicy;
use crate::settings::CommunityPolicyView;

/// Related records which can be loaded together with a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation {
    Authorization,
    License,
    Parent,
    ParentAuthorization,
    Account,
    AccountAuthorization,
    CommunityPolicy,
}

impl Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Relation::Authorization => "authorization",
            Relation::License => "license",
            Relation::Parent => "parent",
            Relation::ParentAuthorization => "parent authorization",
            Relation::Account => "account",
            Relation::AccountAuthorization => "account authorization",
            Relation::CommunityPolicy => "community policy",
        };

        write!(f, "{}", s)
    }
}

/// Selection of relations to load in one consistent read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelationSet {
    pub authorization: bool,
    pub license: bool,
    pub parent: bool,
    pub parent_authorization: bool,
    pub account: bool,
    pub account_authorization: bool,
}

impl RelationSet {
    /// Only the node itself.
    pub const NONE: RelationSet = RelationSet {
        authorization: false,
        license: false,
        parent: false,
        parent_authorization: false,
        account: false,
        account_authorization: false,
    };

    pub const ALL: RelationSet = RelationSet {
        authorization: true,
        license: true,
        parent: true,
        parent_authorization: true,
        account: true,
        account_authorization: true,
    };

    /// The node's own overlays.
    pub const OVERLAYS: RelationSet = RelationSet {
        authorization: true,
        license: true,
        ..RelationSet::NONE
    };
}

/// A node together with the relations requested from [`PolicyStore::load_node`].
///
/// Relations which were not requested, or which do not exist, are `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedNode {
    pub node: ResourceNode,
    pub authorization: Option<AuthorizationPolicy>,
    pub license: Option<License>,
    pub parent: Option<ResourceNode>,
    pub parent_authorization: Option<AuthorizationPolicy>,
    pub account: Option<ResourceNode>,
    pub account_authorization: Option<AuthorizationPolicy>,
}

impl LoadedNode {
    pub fn new(node: ResourceNode) -> Self {
        Self {
            node,
            authorization: None,
            license: None,
            parent: None,
            parent_authorization: None,
            account: None,
            account_authorization: None,
        }
    }
}

/// Persistence for nodes and their authorization and license overlays.
pub trait PolicyStore {
    type Error: Error;

    /// Loads a node together with the selected relations.
    fn load_node(
        &self,
        id: &NodeId,
        relations: RelationSet,
    ) -> impl Future<Output = Result<Option<LoadedNode>, Self::Error>>;

    /// Returns the node whose actor is `actor`, if any.
    fn node_by_actor(
        &self,
        actor: &ActorId,
    ) -> impl Future<Output = Result<Option<NodeId>, Self::Error>>;

    /// Inserts a new node together with its initial overlays.
    fn insert_node(
        &self,
        node: &ResourceNode,
        authorization: &AuthorizationPolicy,
        license: &License,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    /// Overwrites an existing node record, overlays are left untouched.
    fn update_node(&self, node: &ResourceNode) -> impl Future<Output = Result<(), Self::Error>>;

    /// Persists a batch of overlays atomically: either all of them are written or none.
    fn save_overlays(
        &self,
        authorizations: &[AuthorizationPolicy],
        licenses: &[License],
    ) -> impl Future<Output = Result<(), Self::Error>>;

    /// Removes a node together with its authorization and license.
    fn delete_node(&self, id: &NodeId) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Credentials held by actors and the entitlements they grant.
pub trait CredentialIndex {
    type Error: Error;

    fn credentials(
        &self,
        actor: &ActorId,
    ) -> impl Future<Output = Result<Vec<Credential>, Self::Error>>;

    fn has_credential(
        &self,
        actor: &ActorId,
        criterion: &CredentialCriterion,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Sum of the grants for `entitlement_type` across all credentials of `actor`.
    fn granted_entitlement(
        &self,
        entitlement_type: &EntitlementType,
        actor: &ActorId,
    ) -> impl Future<Output = Result<Option<GrantedEntitlement>, Self::Error>>;

    /// Returns false if the actor already held the credential.
    fn assign_credential(
        &self,
        actor: &ActorId,
        credential: Credential,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Returns false if the actor did not hold the credential.
    fn remove_credential(
        &self,
        actor: &ActorId,
        credential: &Credential,
    ) -> impl Future<Output = Result<bool, Self::Error>>;
}

/// External source of entitlements keyed by an opaque subscription id.
pub trait SubscriptionGateway {
    type Error: Error;

    fn is_enabled(&self) -> bool;

    fn entitlements(
        &self,
        subscription_id: &str,
    ) -> impl Future<Output = Result<Vec<GrantedEntitlement>, Self::Error>>;
}

/// Supplies the effective community settings of a space.
pub trait CommunityPolicyResolver {
    type Error: Error;

    fn policy_view(
        &self,
        node_id: &NodeId,
    ) -> impl Future<Output = Result<Option<CommunityPolicyView>, Self::Error>>;
}
