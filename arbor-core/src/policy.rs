// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authorization policy overlay owned by every node.
use std::collections::BTreeSet;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::credential::{Credential, CredentialCriterion};
use crate::id::{NodeId, PolicyId};

/// Action an actor can be authorized to perform on a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Privilege {
    Create,
    Read,
    ReadAbout,
    ReadLicense,
    Update,
    Delete,
    Grant,
    CreateSubspace,
    CreateSpace,
    CreateVirtualContributor,
    CreateInnovationPack,
    CreateInnovationHub,
    AuthorizationReset,
    LicenseReset,
    PlatformAdmin,
    TransferResourceOffer,
    TransferResourceAccept,
    AccountLicenseManage,
    ReceiveNotifications,
}

impl Display for Privilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Privilege::Create => "create",
            Privilege::Read => "read",
            Privilege::ReadAbout => "read-about",
            Privilege::ReadLicense => "read-license",
            Privilege::Update => "update",
            Privilege::Delete => "delete",
            Privilege::Grant => "grant",
            Privilege::CreateSubspace => "create-subspace",
            Privilege::CreateSpace => "create-space",
            Privilege::CreateVirtualContributor => "create-virtual-contributor",
            Privilege::CreateInnovationPack => "create-innovation-pack",
            Privilege::CreateInnovationHub => "create-innovation-hub",
            Privilege::AuthorizationReset => "authorization-reset",
            Privilege::LicenseReset => "license-reset",
            Privilege::PlatformAdmin => "platform-admin",
            Privilege::TransferResourceOffer => "transfer-resource-offer",
            Privilege::TransferResourceAccept => "transfer-resource-accept",
            Privilege::AccountLicenseManage => "account-license-manage",
            Privilege::ReceiveNotifications => "receive-notifications",
        };

        write!(f, "{}", s)
    }
}

/// Grants a set of privileges to every actor holding one of the listed credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRule {
    pub privileges: BTreeSet<Privilege>,
    pub criteria: BTreeSet<CredentialCriterion>,
    pub tag: String,

    /// Rules with `cascade` set are copied into the inherited baseline of descendant nodes,
    /// others only apply to the node they were created on.
    pub cascade: bool,
}

impl CredentialRule {
    pub fn new(
        tag: impl Into<String>,
        privileges: impl IntoIterator<Item = Privilege>,
        criteria: impl IntoIterator<Item = CredentialCriterion>,
        cascade: bool,
    ) -> Self {
        Self {
            privileges: privileges.into_iter().collect(),
            criteria: criteria.into_iter().collect(),
            tag: tag.into(),
            cascade,
        }
    }

    /// Returns true if any of the held credentials satisfies one of the rule's criteria.
    pub fn applies_to(&self, credentials: &[Credential]) -> bool {
        self.criteria
            .iter()
            .any(|criterion| credentials.iter().any(|held| criterion.matches(held)))
    }
}

/// Implication rule: holding `source` also grants `granted`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeRule {
    pub granted: BTreeSet<Privilege>,
    pub source: Privilege,
    pub tag: String,
}

impl PrivilegeRule {
    pub fn new(
        tag: impl Into<String>,
        source: Privilege,
        granted: impl IntoIterator<Item = Privilege>,
    ) -> Self {
        Self {
            granted: granted.into_iter().collect(),
            source,
            tag: tag.into(),
        }
    }
}

/// Access-control overlay of a single node.
///
/// Every propagation pass builds a fresh value with [`AuthorizationPolicy::reset`] which keeps
/// the id and owner, so records referencing the policy stay valid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationPolicy {
    pub id: PolicyId,
    pub owner: NodeId,
    pub anonymous_read_access: bool,
    pub credential_rules: Vec<CredentialRule>,
    pub privilege_rules: Vec<PrivilegeRule>,
}

impl AuthorizationPolicy {
    /// Empty policy as created together with its node.
    pub fn new(id: PolicyId, owner: NodeId) -> Self {
        Self {
            id,
            owner,
            anonymous_read_access: false,
            credential_rules: Vec::new(),
            privilege_rules: Vec::new(),
        }
    }

    /// Returns an empty policy with the same identity.
    pub fn reset(&self) -> Self {
        Self::new(self.id, self.owner)
    }

    /// Copies every cascading credential rule and every privilege rule of `source`, together
    /// with its anonymous read flag.
    pub fn inherit_from(&mut self, source: &AuthorizationPolicy) {
        self.anonymous_read_access = source.anonymous_read_access;

        for rule in source.credential_rules.iter().filter(|rule| rule.cascade) {
            self.append_credential_rule(rule.clone());
        }

        for rule in &source.privilege_rules {
            self.append_privilege_rule(rule.clone());
        }
    }

    /// Appends a credential rule unless an identical one is already present.
    pub fn append_credential_rule(&mut self, rule: CredentialRule) {
        if !self.credential_rules.contains(&rule) {
            self.credential_rules.push(rule);
        }
    }

    /// Appends a privilege rule unless an identical one is already present.
    pub fn append_privilege_rule(&mut self, rule: PrivilegeRule) {
        if !self.privilege_rules.contains(&rule) {
            self.privilege_rules.push(rule);
        }
    }

    /// Returns all credential rules carrying the given tag.
    pub fn credential_rules_by_tag<'a>(
        &'a self,
        tag: &'a str,
    ) -> impl Iterator<Item = &'a CredentialRule> + 'a {
        self.credential_rules.iter().filter(move |rule| rule.tag == tag)
    }

    /// Computes the privileges granted to an actor holding the given credentials.
    ///
    /// Anonymous read access grants `Read` to everyone. Privilege rules are applied once, on top
    /// of what the credential rules granted.
    pub fn granted_privileges(&self, credentials: &[Credential]) -> BTreeSet<Privilege> {
        let mut granted: BTreeSet<Privilege> = self
            .credential_rules
            .iter()
            .filter(|rule| rule.applies_to(credentials))
            .flat_map(|rule| rule.privileges.iter().copied())
            .collect();

        if self.anonymous_read_access {
            granted.insert(Privilege::Read);
        }

        let implied: Vec<Privilege> = self
            .privilege_rules
            .iter()
            .filter(|rule| granted.contains(&rule.source))
            .flat_map(|rule| rule.granted.iter().copied())
            .collect();
        granted.extend(implied);

        granted
    }

    pub fn has_privilege(&self, credentials: &[Credential], privilege: Privilege) -> bool {
        self.granted_privileges(credentials).contains(&privilege)
    }
}
