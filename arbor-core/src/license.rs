// SPDX-License-Identifier: MIT OR Apache-2.0

//! License overlay and entitlements.
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::id::{LicenseId, NodeId};

/// One capability limit attached to a license.
///
/// Unknown names are carried as [`EntitlementType::Other`] and pass through resolution
/// unchanged on account licenses.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntitlementType {
    AccountSpaceFree,
    AccountSpacePlus,
    AccountSpacePremium,
    AccountVirtualContributor,
    AccountInnovationPack,
    AccountInnovationHub,
    SpaceFree,
    SpacePlus,
    SpacePremium,
    SpaceFlagSaveAsTemplate,
    SpaceFlagVirtualContributorAccess,
    SpaceFlagWhiteboardMultiUser,
    SpaceFlagMemoMultiUser,
    Other(String),
}

impl EntitlementType {
    /// Entitlements every account license carries.
    pub const ACCOUNT: [EntitlementType; 6] = [
        EntitlementType::AccountSpaceFree,
        EntitlementType::AccountSpacePlus,
        EntitlementType::AccountSpacePremium,
        EntitlementType::AccountVirtualContributor,
        EntitlementType::AccountInnovationPack,
        EntitlementType::AccountInnovationHub,
    ];

    /// Entitlements every space license carries.
    pub const SPACE: [EntitlementType; 7] = [
        EntitlementType::SpaceFree,
        EntitlementType::SpacePlus,
        EntitlementType::SpacePremium,
        EntitlementType::SpaceFlagSaveAsTemplate,
        EntitlementType::SpaceFlagVirtualContributorAccess,
        EntitlementType::SpaceFlagWhiteboardMultiUser,
        EntitlementType::SpaceFlagMemoMultiUser,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            EntitlementType::AccountSpaceFree => "account-space-free",
            EntitlementType::AccountSpacePlus => "account-space-plus",
            EntitlementType::AccountSpacePremium => "account-space-premium",
            EntitlementType::AccountVirtualContributor => "account-virtual-contributor",
            EntitlementType::AccountInnovationPack => "account-innovation-pack",
            EntitlementType::AccountInnovationHub => "account-innovation-hub",
            EntitlementType::SpaceFree => "space-free",
            EntitlementType::SpacePlus => "space-plus",
            EntitlementType::SpacePremium => "space-premium",
            EntitlementType::SpaceFlagSaveAsTemplate => "space-flag-save-as-template",
            EntitlementType::SpaceFlagVirtualContributorAccess => {
                "space-flag-virtual-contributor-access"
            }
            EntitlementType::SpaceFlagWhiteboardMultiUser => "space-flag-whiteboard-multi-user",
            EntitlementType::SpaceFlagMemoMultiUser => "space-flag-memo-multi-user",
            EntitlementType::Other(name) => name,
        }
    }
}

impl From<String> for EntitlementType {
    fn from(value: String) -> Self {
        EntitlementType::ACCOUNT
            .into_iter()
            .chain(EntitlementType::SPACE)
            .find(|known| known.as_str() == value)
            .unwrap_or(EntitlementType::Other(value))
    }
}

impl From<&str> for EntitlementType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<EntitlementType> for String {
    fn from(value: EntitlementType) -> Self {
        match value {
            EntitlementType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl Display for EntitlementType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntitlementDataType {
    /// Numeric cap, `enabled` follows `limit > 0`.
    Limit,

    /// On/off switch.
    Flag,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub entitlement_type: EntitlementType,
    pub data_type: EntitlementDataType,
    pub limit: i64,
    pub enabled: bool,
}

impl Entitlement {
    /// Disabled entitlement with a zero limit.
    pub fn new(entitlement_type: EntitlementType, data_type: EntitlementDataType) -> Self {
        Self {
            entitlement_type,
            data_type,
            limit: 0,
            enabled: false,
        }
    }

    pub fn reset(&mut self) {
        self.limit = 0;
        self.enabled = false;
    }

    /// Overwrites the limit and derives `enabled` from it.
    pub fn set_limit(&mut self, limit: i64) {
        self.limit = limit;
        self.enabled = limit > 0;
    }
}

/// Entitlement amount granted by an external source (a licensing credential or a subscription).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantedEntitlement {
    pub entitlement_type: EntitlementType,
    pub limit: i64,
}

impl GrantedEntitlement {
    pub fn new(entitlement_type: impl Into<EntitlementType>, limit: i64) -> Self {
        Self {
            entitlement_type: entitlement_type.into(),
            limit,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LicenseType {
    Account,
    Space,
}

/// Lifecycle state of a licensed resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    #[default]
    Active,
    Demo,
    Inactive,
    Archived,
}

/// License overlay of a single node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub id: LicenseId,
    pub owner: NodeId,
    pub license_type: LicenseType,
    pub visibility: Visibility,
    pub entitlements: Vec<Entitlement>,
}

impl License {
    /// Account license with the six account entitlements, all disabled.
    pub fn account(id: LicenseId, owner: NodeId) -> Self {
        Self {
            id,
            owner,
            license_type: LicenseType::Account,
            visibility: Visibility::Active,
            entitlements: EntitlementType::ACCOUNT
                .into_iter()
                .map(|entitlement_type| {
                    Entitlement::new(entitlement_type, EntitlementDataType::Limit)
                })
                .collect(),
        }
    }

    /// Space license with the space entitlements, all disabled.
    pub fn space(id: LicenseId, owner: NodeId) -> Self {
        Self {
            id,
            owner,
            license_type: LicenseType::Space,
            visibility: Visibility::Active,
            entitlements: EntitlementType::SPACE
                .into_iter()
                .map(|entitlement_type| {
                    Entitlement::new(entitlement_type, EntitlementDataType::Flag)
                })
                .collect(),
        }
    }

    /// Returns a copy with every entitlement reset, keeping identity and visibility.
    pub fn reset(&self) -> Self {
        let mut license = self.clone();
        license.entitlements.iter_mut().for_each(Entitlement::reset);
        license
    }

    pub fn entitlement(&self, entitlement_type: &EntitlementType) -> Option<&Entitlement> {
        self.entitlements
            .iter()
            .find(|entitlement| &entitlement.entitlement_type == entitlement_type)
    }

    pub fn limit(&self, entitlement_type: &EntitlementType) -> Option<i64> {
        self.entitlement(entitlement_type)
            .map(|entitlement| entitlement.limit)
    }

    pub fn is_enabled(&self, entitlement_type: &EntitlementType) -> bool {
        self.entitlement(entitlement_type)
            .is_some_and(|entitlement| entitlement.enabled)
    }
}

/// Numeric caps attached to an account at creation.
///
/// The plan is read-only input for license resolution, it never changes during propagation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineLicensePlan {
    pub space_free: i64,
    pub space_plus: i64,
    pub space_premium: i64,
    pub virtual_contributor: i64,
    pub innovation_packs: i64,
    pub starting_pages: i64,
}

impl BaselineLicensePlan {
    /// Returns the plan's cap for an entitlement type, if the plan covers it.
    pub fn limit_for(&self, entitlement_type: &EntitlementType) -> Option<i64> {
        match entitlement_type {
            EntitlementType::AccountSpaceFree => Some(self.space_free),
            EntitlementType::AccountSpacePlus => Some(self.space_plus),
            EntitlementType::AccountSpacePremium => Some(self.space_premium),
            EntitlementType::AccountVirtualContributor => Some(self.virtual_contributor),
            EntitlementType::AccountInnovationPack => Some(self.innovation_packs),
            EntitlementType::AccountInnovationHub => Some(self.starting_pages),
            _ => None,
        }
    }
}
