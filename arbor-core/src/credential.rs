// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credentials held by actors and matched by credential rules.
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// Kind of a credential.
///
/// Global roles are platform-wide and usually carry no resource scope, resource roles are scoped
/// to one account or space, licensing-plan credentials grant entitlements through the
/// [`LicensingFramework`](crate::LicensingFramework).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialType {
    GlobalAdmin,
    GlobalSupport,
    GlobalLicenseManager,
    GlobalSpacesReader,
    GlobalCommunityRead,
    GlobalRegistered,
    AccountAdmin,
    SpaceAdmin,
    SpaceLead,
    SpaceMember,
    AccountLicenseFree,
    AccountLicensePlus,
    SpaceLicenseFree,
    SpaceLicensePlus,
    SpaceLicensePremium,
    SpaceFeatureSaveAsTemplate,
    SpaceFeatureVirtualContributors,
    SpaceFeatureWhiteboardMultiUser,
    SpaceFeatureMemoMultiUser,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::GlobalAdmin => "global-admin",
            CredentialType::GlobalSupport => "global-support",
            CredentialType::GlobalLicenseManager => "global-license-manager",
            CredentialType::GlobalSpacesReader => "global-spaces-reader",
            CredentialType::GlobalCommunityRead => "global-community-read",
            CredentialType::GlobalRegistered => "global-registered",
            CredentialType::AccountAdmin => "account-admin",
            CredentialType::SpaceAdmin => "space-admin",
            CredentialType::SpaceLead => "space-lead",
            CredentialType::SpaceMember => "space-member",
            CredentialType::AccountLicenseFree => "account-license-free",
            CredentialType::AccountLicensePlus => "account-license-plus",
            CredentialType::SpaceLicenseFree => "space-license-free",
            CredentialType::SpaceLicensePlus => "space-license-plus",
            CredentialType::SpaceLicensePremium => "space-license-premium",
            CredentialType::SpaceFeatureSaveAsTemplate => "space-feature-save-as-template",
            CredentialType::SpaceFeatureVirtualContributors => {
                "space-feature-virtual-contributors"
            }
            CredentialType::SpaceFeatureWhiteboardMultiUser => {
                "space-feature-whiteboard-multi-user"
            }
            CredentialType::SpaceFeatureMemoMultiUser => "space-feature-memo-multi-user",
        }
    }
}

impl Display for CredentialType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A credential, optionally scoped to one resource.
///
/// The same value is used for what an actor holds and for what a rule asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub credential_type: CredentialType,
    pub resource_id: Option<NodeId>,
}

/// Credential as it appears inside a rule.
pub type CredentialCriterion = Credential;

impl Credential {
    /// Credential which is valid platform-wide.
    pub fn global(credential_type: CredentialType) -> Self {
        Self {
            credential_type,
            resource_id: None,
        }
    }

    /// Credential scoped to a single account or space.
    pub fn scoped(credential_type: CredentialType, resource_id: NodeId) -> Self {
        Self {
            credential_type,
            resource_id: Some(resource_id),
        }
    }

    /// Returns true if a held credential satisfies this criterion.
    ///
    /// A criterion without resource scope matches any held credential of the same type.
    pub fn matches(&self, held: &Credential) -> bool {
        if self.credential_type != held.credential_type {
            return false;
        }

        match self.resource_id {
            Some(resource_id) => held.resource_id == Some(resource_id),
            None => true,
        }
    }
}

impl Display for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.resource_id {
            Some(resource_id) => write!(f, "{}@{}", self.credential_type, resource_id),
            None => write!(f, "{}", self.credential_type),
        }
    }
}
