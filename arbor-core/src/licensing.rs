// SPDX-License-Identifier: MIT OR Apache-2.0

//! Catalog of licensing-plan credentials and the entitlements they grant.
use serde::{Deserialize, Serialize};

use crate::credential::{Credential, CredentialType};
use crate::license::{EntitlementType, GrantedEntitlement};

/// Entitlements granted to the holder of one credential type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensingCredentialRule {
    pub name: String,
    pub credential_type: CredentialType,
    pub granted: Vec<GrantedEntitlement>,
}

impl LicensingCredentialRule {
    pub fn new(
        name: impl Into<String>,
        credential_type: CredentialType,
        granted: impl IntoIterator<Item = (EntitlementType, i64)>,
    ) -> Self {
        Self {
            name: name.into(),
            credential_type,
            granted: granted
                .into_iter()
                .map(|(entitlement_type, limit)| GrantedEntitlement::new(entitlement_type, limit))
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensingFramework {
    pub rules: Vec<LicensingCredentialRule>,
}

impl LicensingFramework {
    pub fn new(rules: Vec<LicensingCredentialRule>) -> Self {
        Self { rules }
    }

    /// Sums the grants for one entitlement type over all held credentials.
    ///
    /// Returns `None` when no held credential grants the type at all.
    pub fn granted_entitlement(
        &self,
        entitlement_type: &EntitlementType,
        credentials: &[Credential],
    ) -> Option<GrantedEntitlement> {
        let mut total: Option<i64> = None;

        for credential in credentials {
            for rule in self
                .rules
                .iter()
                .filter(|rule| rule.credential_type == credential.credential_type)
            {
                for granted in rule
                    .granted
                    .iter()
                    .filter(|granted| &granted.entitlement_type == entitlement_type)
                {
                    let sum = total.get_or_insert(0);
                    *sum = sum.saturating_add(granted.limit);
                }
            }
        }

        total.map(|limit| GrantedEntitlement::new(entitlement_type.clone(), limit))
    }
}

impl Default for LicensingFramework {
    fn default() -> Self {
        use CredentialType::*;
        use EntitlementType as E;

        Self::new(vec![
            LicensingCredentialRule::new(
                "account-free",
                AccountLicenseFree,
                [(E::AccountSpaceFree, 1)],
            ),
            LicensingCredentialRule::new(
                "account-plus",
                AccountLicensePlus,
                [
                    (E::AccountSpaceFree, 3),
                    (E::AccountVirtualContributor, 3),
                    (E::AccountInnovationHub, 1),
                    (E::AccountInnovationPack, 3),
                ],
            ),
            LicensingCredentialRule::new("space-free", SpaceLicenseFree, [(E::SpaceFree, 1)]),
            LicensingCredentialRule::new(
                "space-plus",
                SpaceLicensePlus,
                [
                    (E::SpacePlus, 1),
                    (E::SpaceFlagWhiteboardMultiUser, 1),
                    (E::SpaceFlagSaveAsTemplate, 1),
                ],
            ),
            LicensingCredentialRule::new(
                "space-premium",
                SpaceLicensePremium,
                [
                    (E::SpacePremium, 1),
                    (E::SpaceFlagWhiteboardMultiUser, 1),
                    (E::SpaceFlagSaveAsTemplate, 1),
                ],
            ),
            LicensingCredentialRule::new(
                "space-feature-save-as-template",
                SpaceFeatureSaveAsTemplate,
                [(E::SpaceFlagSaveAsTemplate, 1)],
            ),
            LicensingCredentialRule::new(
                "space-feature-virtual-contributors",
                SpaceFeatureVirtualContributors,
                [(E::SpaceFlagVirtualContributorAccess, 1)],
            ),
            LicensingCredentialRule::new(
                "space-feature-whiteboard-multi-user",
                SpaceFeatureWhiteboardMultiUser,
                [(E::SpaceFlagWhiteboardMultiUser, 1)],
            ),
            LicensingCredentialRule::new(
                "space-feature-memo-multi-user",
                SpaceFeatureMemoMultiUser,
                [(E::SpaceFlagMemoMultiUser, 1)],
            ),
        ])
    }
}
