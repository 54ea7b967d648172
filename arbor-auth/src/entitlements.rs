// SPDX-License-Identifier: MIT OR Apache-2.0

//! Computes the license overlay of a single node.
//!
//! Account licenses are built from three layers, each only overwriting the entitlements it has
//! data for:
//!
//! 1. baseline plan of the account (overwrite)
//! 2. licensing credentials of the account's actor (additive)
//! 3. external subscription (overwrite, forces `enabled`)
//!
//! Space licenses are switched on per entitlement type, depending on what the licensing
//! credentials of the root account's actor grant.
use arbor_core::traits::{CredentialIndex, SubscriptionGateway};
use arbor_core::{
    ActorId, BaselineLicensePlan, EntitlementType, License, NodeId, NodeKind, ResourceNode,
};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::Config;

pub struct EntitlementResolver<'a, C, G> {
    credentials: &'a C,
    gateway: &'a G,
    config: &'a Config,
}

impl<'a, C, G> EntitlementResolver<'a, C, G>
where
    C: CredentialIndex,
    G: SubscriptionGateway,
{
    pub fn new(credentials: &'a C, gateway: &'a G, config: &'a Config) -> Self {
        Self {
            credentials,
            gateway,
            config,
        }
    }

    /// Builds a new license for `node`, keeping the identity and visibility of `license`.
    ///
    /// `root_actor` is the actor of the account owning the tree, `baseline` the plan of that
    /// account. Accounts use their own actor and plan.
    pub async fn resolve_license(
        &self,
        node: &ResourceNode,
        license: &License,
        root_actor: &ActorId,
        baseline: Option<&BaselineLicensePlan>,
    ) -> Result<License, LicensingError<C::Error>> {
        let license = license.reset();

        let license = match &node.kind {
            NodeKind::Account(details) => {
                let license = Self::apply_baseline_plan(license, &details.baseline_plan);
                let license = self
                    .apply_credential_grants(license, &node.actor_id)
                    .await?;
                match &details.external_subscription_id {
                    Some(subscription_id) => {
                        self.apply_subscription(license, subscription_id).await
                    }
                    None => license,
                }
            }
            NodeKind::SpaceRoot(_) => {
                let license = match baseline {
                    Some(plan) => Self::apply_baseline_plan(license, plan),
                    None => license,
                };
                self.apply_node_entitlements(node.id, license, root_actor)
                    .await?
            }
            NodeKind::Subspace(_) => {
                self.apply_node_entitlements(node.id, license, root_actor)
                    .await?
            }
        };

        Ok(license)
    }

    /// Overwrites every entitlement the plan has a cap for.
    pub fn apply_baseline_plan(mut license: License, plan: &BaselineLicensePlan) -> License {
        for entitlement in license.entitlements.iter_mut() {
            if let Some(limit) = plan.limit_for(&entitlement.entitlement_type) {
                entitlement.set_limit(limit);
            }
        }

        license
    }

    /// Adds what the actor's licensing credentials grant on top of the current limits.
    pub async fn apply_credential_grants(
        &self,
        mut license: License,
        actor: &ActorId,
    ) -> Result<License, LicensingError<C::Error>> {
        for entitlement in license.entitlements.iter_mut() {
            let granted = self
                .credentials
                .granted_entitlement(&entitlement.entitlement_type, actor)
                .await
                .map_err(LicensingError::Credentials)?;

            if let Some(granted) = granted {
                trace!(
                    entitlement_type = %entitlement.entitlement_type,
                    limit = granted.limit,
                    "credential grant"
                );
                entitlement.set_limit(entitlement.limit.saturating_add(granted.limit));
            }
        }

        Ok(license)
    }

    /// Overwrites entitlements with the values of an external subscription.
    ///
    /// Matching entitlements are enabled even when the external limit is zero. A failing or
    /// empty subscription leaves the license unchanged.
    pub async fn apply_subscription(&self, mut license: License, subscription_id: &str) -> License {
        if !self.config.subscriptions_enabled() || !self.gateway.is_enabled() {
            trace!(subscription_id, "subscriptions disabled");
            return license;
        }

        let granted = match self.gateway.entitlements(subscription_id).await {
            Ok(granted) => granted,
            Err(err) => {
                warn!(
                    subscription_id,
                    license = %license.id,
                    "failed fetching subscription entitlements, skipping: {err}"
                );
                return license;
            }
        };

        if granted.is_empty() {
            warn!(
                subscription_id,
                license = %license.id,
                "subscription returned no entitlements, skipping"
            );
            return license;
        }

        for entitlement in license.entitlements.iter_mut() {
            if let Some(external) = granted
                .iter()
                .find(|granted| granted.entitlement_type == entitlement.entitlement_type)
            {
                entitlement.limit = external.limit;
                entitlement.enabled = true;
            }
        }

        debug!(subscription_id, license = %license.id, "applied subscription entitlements");

        license
    }

    /// Switches on every space entitlement the root actor's credentials grant.
    ///
    /// Fails on any entitlement type a space license does not know about.
    pub async fn apply_node_entitlements(
        &self,
        node: NodeId,
        mut license: License,
        root_actor: &ActorId,
    ) -> Result<License, LicensingError<C::Error>> {
        for entitlement in license.entitlements.iter_mut() {
            match &entitlement.entitlement_type {
                EntitlementType::SpaceFree
                | EntitlementType::SpacePlus
                | EntitlementType::SpacePremium
                | EntitlementType::SpaceFlagSaveAsTemplate
                | EntitlementType::SpaceFlagVirtualContributorAccess
                | EntitlementType::SpaceFlagWhiteboardMultiUser
                | EntitlementType::SpaceFlagMemoMultiUser => {
                    let granted = self
                        .credentials
                        .granted_entitlement(&entitlement.entitlement_type, root_actor)
                        .await
                        .map_err(LicensingError::Credentials)?;

                    if granted.is_some_and(|granted| granted.limit > 0) {
                        entitlement.limit = 1;
                        entitlement.enabled = true;
                    }
                }
                EntitlementType::AccountSpaceFree
                | EntitlementType::AccountSpacePlus
                | EntitlementType::AccountSpacePremium
                | EntitlementType::AccountVirtualContributor
                | EntitlementType::AccountInnovationPack
                | EntitlementType::AccountInnovationHub
                | EntitlementType::Other(_) => {
                    return Err(LicensingError::UnknownEntitlementType {
                        node,
                        entitlement_type: entitlement.entitlement_type.clone(),
                    });
                }
            }
        }

        Ok(license)
    }
}

#[derive(Debug, Error)]
pub enum LicensingError<CE> {
    #[error("failed querying credential index: {0}")]
    Credentials(CE),

    #[error("entitlement type {entitlement_type} is not supported on the license of node {node}")]
    UnknownEntitlementType {
        node: NodeId,
        entitlement_type: EntitlementType,
    },
}

#[cfg(test)]
mod tests {
    use arbor_core::traits::CredentialIndex;
    use arbor_core::{
        BaselineLicensePlan, Credential, CredentialType, Entitlement, EntitlementDataType,
        EntitlementType, GrantedEntitlement, License, LicensingCredentialRule,
        LicensingFramework,
    };
    use arbor_store::MemoryStore;
    use assert_matches::assert_matches;

    use crate::config::Config;
    use crate::test_utils::{
        FailingSubscriptionGateway, MemorySubscriptionGateway, account_node, root_space_node,
        subspace_node,
    };

    use super::{EntitlementResolver, LicensingError};

    fn account_with(
        plan: BaselineLicensePlan,
        subscription_id: Option<&str>,
    ) -> arbor_core::ResourceNode {
        let mut node = account_node();
        let details = node.account_details_mut().unwrap();
        details.baseline_plan = plan;
        details.external_subscription_id = subscription_id.map(str::to_string);
        node
    }

    #[tokio::test]
    async fn baseline_overwrites_mapped_types_only() {
        let store = MemoryStore::new();
        let gateway = MemorySubscriptionGateway::disabled();
        let config = Config::new();
        let resolver = EntitlementResolver::new(&store, &gateway, &config);

        let account = account_with(
            BaselineLicensePlan {
                space_free: 1,
                innovation_packs: 2,
                ..Default::default()
            },
            None,
        );
        let mut license = License::account(account.license_id, account.id);
        let mut other = Entitlement::new(
            EntitlementType::Other("account-future-feature".into()),
            EntitlementDataType::Limit,
        );
        other.set_limit(9);
        license.entitlements.push(other);

        let resolved = resolver
            .resolve_license(&account, &license, &account.actor_id, None)
            .await
            .unwrap();

        assert_eq!(resolved.limit(&EntitlementType::AccountSpaceFree), Some(1));
        assert!(resolved.is_enabled(&EntitlementType::AccountSpaceFree));
        assert_eq!(resolved.limit(&EntitlementType::AccountInnovationPack), Some(2));
        assert_eq!(resolved.limit(&EntitlementType::AccountSpacePlus), Some(0));
        assert!(!resolved.is_enabled(&EntitlementType::AccountSpacePlus));

        // Unknown types are reset but otherwise left alone on accounts.
        let other = EntitlementType::Other("account-future-feature".into());
        assert_eq!(resolved.limit(&other), Some(0));
        assert_eq!(resolved.entitlements.len(), 7);
    }

    #[tokio::test]
    async fn credential_grants_add_up() {
        let framework = LicensingFramework::new(vec![
            LicensingCredentialRule::new(
                "plus",
                CredentialType::AccountLicensePlus,
                [(EntitlementType::AccountVirtualContributor, 3)],
            ),
            LicensingCredentialRule::new(
                "free",
                CredentialType::AccountLicenseFree,
                [(EntitlementType::AccountVirtualContributor, 3)],
            ),
        ]);
        let store = MemoryStore::with_framework(framework);
        let gateway = MemorySubscriptionGateway::disabled();
        let config = Config::new();
        let resolver = EntitlementResolver::new(&store, &gateway, &config);

        let account = account_with(BaselineLicensePlan::default(), None);
        for credential_type in [
            CredentialType::AccountLicensePlus,
            CredentialType::AccountLicenseFree,
        ] {
            store
                .assign_credential(&account.actor_id, Credential::global(credential_type))
                .await
                .unwrap();
        }

        let license = License::account(account.license_id, account.id);
        let resolved = resolver
            .resolve_license(&account, &license, &account.actor_id, None)
            .await
            .unwrap();
        assert_eq!(
            resolved.limit(&EntitlementType::AccountVirtualContributor),
            Some(6)
        );
        assert!(resolved.is_enabled(&EntitlementType::AccountVirtualContributor));
    }

    #[tokio::test]
    async fn credential_grants_saturate() {
        let store = MemoryStore::with_framework(LicensingFramework::new(vec![
            LicensingCredentialRule::new(
                "plus",
                CredentialType::AccountLicensePlus,
                [(EntitlementType::AccountVirtualContributor, 3)],
            ),
        ]));
        let gateway = MemorySubscriptionGateway::disabled();
        let config = Config::new();
        let resolver = EntitlementResolver::new(&store, &gateway, &config);

        let account = account_with(
            BaselineLicensePlan {
                virtual_contributor: i64::MAX,
                ..Default::default()
            },
            None,
        );
        store
            .assign_credential(
                &account.actor_id,
                Credential::global(CredentialType::AccountLicensePlus),
            )
            .await
            .unwrap();

        let license = License::account(account.license_id, account.id);
        let resolved = resolver
            .resolve_license(&account, &license, &account.actor_id, None)
            .await
            .unwrap();
        assert_eq!(
            resolved.limit(&EntitlementType::AccountVirtualContributor),
            Some(i64::MAX)
        );
    }

    #[tokio::test]
    async fn subscription_takes_precedence() {
        let store = MemoryStore::new();
        let gateway = MemorySubscriptionGateway::new();
        gateway
            .set_entitlements(
                "sub-1",
                vec![GrantedEntitlement::new(EntitlementType::AccountSpaceFree, 7)],
            )
            .await;
        let config = Config::new();
        let resolver = EntitlementResolver::new(&store, &gateway, &config);

        let account = account_with(
            BaselineLicensePlan {
                space_free: 2,
                virtual_contributor: 1,
                ..Default::default()
            },
            Some("sub-1"),
        );
        store
            .assign_credential(
                &account.actor_id,
                Credential::global(CredentialType::AccountLicensePlus),
            )
            .await
            .unwrap();

        let license = License::account(account.license_id, account.id);
        let resolved = resolver
            .resolve_license(&account, &license, &account.actor_id, None)
            .await
            .unwrap();

        // Baseline 2 plus credential 3 is replaced by the subscription value.
        assert_eq!(resolved.limit(&EntitlementType::AccountSpaceFree), Some(7));
        // Types the subscription does not mention keep the first two layers' result.
        assert_eq!(
            resolved.limit(&EntitlementType::AccountVirtualContributor),
            Some(4)
        );
    }

    #[tokio::test]
    async fn subscription_enables_zero_limits() {
        let store = MemoryStore::new();
        let gateway = MemorySubscriptionGateway::new();
        gateway
            .set_entitlements(
                "sub-zero",
                vec![GrantedEntitlement::new(
                    EntitlementType::AccountSpacePremium,
                    0,
                )],
            )
            .await;
        let config = Config::new();
        let resolver = EntitlementResolver::new(&store, &gateway, &config);

        let account = account_with(BaselineLicensePlan::default(), Some("sub-zero"));
        let license = License::account(account.license_id, account.id);
        let resolved = resolver
            .resolve_license(&account, &license, &account.actor_id, None)
            .await
            .unwrap();

        let premium = resolved
            .entitlement(&EntitlementType::AccountSpacePremium)
            .unwrap();
        assert_eq!(premium.limit, 0);
        assert!(premium.enabled);
    }

    #[tokio::test]
    async fn failing_or_empty_subscription_is_skipped() {
        let store = MemoryStore::new();
        let config = Config::new();
        let account = account_with(
            BaselineLicensePlan {
                space_free: 2,
                ..Default::default()
            },
            Some("sub-1"),
        );
        let license = License::account(account.license_id, account.id);

        let failing = FailingSubscriptionGateway;
        let resolver = EntitlementResolver::new(&store, &failing, &config);
        let resolved = resolver
            .resolve_license(&account, &license, &account.actor_id, None)
            .await
            .unwrap();
        assert_eq!(resolved.limit(&EntitlementType::AccountSpaceFree), Some(2));

        let empty = MemorySubscriptionGateway::new();
        empty.set_entitlements("sub-1", Vec::new()).await;
        let resolver = EntitlementResolver::new(&store, &empty, &config);
        let resolved = resolver
            .resolve_license(&account, &license, &account.actor_id, None)
            .await
            .unwrap();
        assert_eq!(resolved.limit(&EntitlementType::AccountSpaceFree), Some(2));
    }

    #[tokio::test]
    async fn disabled_subscriptions_are_not_consulted() {
        let store = MemoryStore::new();
        let gateway = MemorySubscriptionGateway::new();
        gateway
            .set_entitlements(
                "sub-1",
                vec![GrantedEntitlement::new(EntitlementType::AccountSpaceFree, 5)],
            )
            .await;
        let config = Config::new().with_subscriptions(false);
        let resolver = EntitlementResolver::new(&store, &gateway, &config);

        let account = account_with(BaselineLicensePlan::default(), Some("sub-1"));
        let license = License::account(account.license_id, account.id);
        let resolved = resolver
            .resolve_license(&account, &license, &account.actor_id, None)
            .await
            .unwrap();
        assert_eq!(resolved.limit(&EntitlementType::AccountSpaceFree), Some(0));
        assert_eq!(gateway.requests().await, 0);
    }

    #[tokio::test]
    async fn spaces_follow_the_root_actor() {
        let store = MemoryStore::new();
        let gateway = MemorySubscriptionGateway::disabled();
        let config = Config::new();
        let resolver = EntitlementResolver::new(&store, &gateway, &config);

        let account = account_node();
        let space = root_space_node(&account);
        let subspace = subspace_node(&space);
        store
            .assign_credential(
                &account.actor_id,
                Credential::global(CredentialType::SpaceLicensePlus),
            )
            .await
            .unwrap();
        // Credentials of the subspace's own actor are irrelevant.
        store
            .assign_credential(
                &subspace.actor_id,
                Credential::global(CredentialType::SpaceFeatureMemoMultiUser),
            )
            .await
            .unwrap();

        let license = License::space(subspace.license_id, subspace.id);
        let resolved = resolver
            .resolve_license(&subspace, &license, &account.actor_id, None)
            .await
            .unwrap();

        for enabled in [
            EntitlementType::SpacePlus,
            EntitlementType::SpaceFlagWhiteboardMultiUser,
            EntitlementType::SpaceFlagSaveAsTemplate,
        ] {
            assert_eq!(resolved.limit(&enabled), Some(1));
            assert!(resolved.is_enabled(&enabled));
        }
        assert!(!resolved.is_enabled(&EntitlementType::SpaceFlagMemoMultiUser));
        assert!(!resolved.is_enabled(&EntitlementType::SpacePremium));

        let license = License::space(space.license_id, space.id);
        let plan = BaselineLicensePlan {
            space_free: 3,
            ..Default::default()
        };
        let resolved = resolver
            .resolve_license(&space, &license, &account.actor_id, Some(&plan))
            .await
            .unwrap();
        assert!(resolved.is_enabled(&EntitlementType::SpacePlus));
        assert!(!resolved.is_enabled(&EntitlementType::SpaceFree));
    }

    #[tokio::test]
    async fn unknown_space_entitlement_is_fatal() {
        let store = MemoryStore::new();
        let gateway = MemorySubscriptionGateway::disabled();
        let config = Config::new();
        let resolver = EntitlementResolver::new(&store, &gateway, &config);

        let account = account_node();
        let space = root_space_node(&account);

        let mut license = License::space(space.license_id, space.id);
        license.entitlements.push(Entitlement::new(
            EntitlementType::Other("space-flag-future-feature".into()),
            EntitlementDataType::Flag,
        ));
        let result = resolver
            .resolve_license(&space, &license, &account.actor_id, None)
            .await;
        assert_matches!(
            result,
            Err(LicensingError::UnknownEntitlementType { node, .. }) if node == space.id
        );

        let mut license = License::space(space.license_id, space.id);
        license.entitlements.push(Entitlement::new(
            EntitlementType::AccountSpaceFree,
            EntitlementDataType::Limit,
        ));
        let result = resolver
            .resolve_license(&space, &license, &account.actor_id, None)
            .await;
        assert_matches!(
            result,
            Err(LicensingError::UnknownEntitlementType {
                entitlement_type: EntitlementType::AccountSpaceFree,
                ..
            })
        );
    }
}
