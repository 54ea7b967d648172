// SPDX-License-Identifier: MIT OR Apache-2.0

//! Depth-first propagation of authorization and license overlays through a node tree.
use std::collections::HashSet;

use arbor_core::traits::{
    CommunityPolicyResolver, CredentialIndex, PolicyStore, Relation, RelationSet,
    SubscriptionGateway,
};
use arbor_core::{
    ActorId, AuthorizationPolicy, BaselineLicensePlan, EntitlementType, License, NodeId,
    NodeKind, ResourceNode,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cascade::{AuthorizationCascadeEngine, CascadeError, PolicyInputs};
use crate::config::Config;
use crate::entitlements::{EntitlementResolver, LicensingError};

/// Every overlay computed during one propagation run, parents before their children.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropagationResult {
    pub authorizations: Vec<AuthorizationPolicy>,
    pub licenses: Vec<License>,
}

impl PropagationResult {
    pub fn is_empty(&self) -> bool {
        self.authorizations.is_empty() && self.licenses.is_empty()
    }

    pub fn authorization(&self, owner: &NodeId) -> Option<&AuthorizationPolicy> {
        self.authorizations
            .iter()
            .find(|authorization| &authorization.owner == owner)
    }

    pub fn license(&self, owner: &NodeId) -> Option<&License> {
        self.licenses.iter().find(|license| &license.owner == owner)
    }

    fn push(&mut self, authorization: AuthorizationPolicy, license: License) {
        self.authorizations.push(authorization);
        self.licenses.push(license);
    }

    fn extend(&mut self, other: PropagationResult) {
        self.authorizations.extend(other.authorizations);
        self.licenses.extend(other.licenses);
    }
}

/// State of the owning account, threaded unchanged through every recursive call.
struct Lineage {
    root_actor: ActorId,
    baseline: BaselineLicensePlan,
    account_policy: AuthorizationPolicy,
}

/// Walks account, root spaces and subspaces top-down, computing each node's license before its
/// authorization and handing every child the freshly computed policy of its parent.
///
/// Revisited nodes and branches deeper than the configured maximum are skipped with a warning,
/// sibling branches still complete.
pub struct TreePropagationDriver<'a, S, C, G> {
    store: &'a S,
    credentials: &'a C,
    gateway: &'a G,
    config: &'a Config,
}

impl<'a, S, C, G> TreePropagationDriver<'a, S, C, G>
where
    S: PolicyStore + CommunityPolicyResolver<Error = <S as PolicyStore>::Error>,
    C: CredentialIndex,
    G: SubscriptionGateway,
{
    pub fn new(store: &'a S, credentials: &'a C, gateway: &'a G, config: &'a Config) -> Self {
        Self {
            store,
            credentials,
            gateway,
            config,
        }
    }

    /// Computes the overlays of a node and all its descendants without persisting them.
    pub async fn propagate(&self, id: &NodeId) -> Result<PropagationResult, DriverError<S, C>> {
        let loaded = self
            .store
            .load_node(id, RelationSet::ALL)
            .await
            .map_err(Self::store_error)?
            .ok_or_else(|| Self::not_found(*id))?;
        let missing = |relation| Self::missing(*id, relation);

        let mut visited = HashSet::new();

        if loaded.node.is_account() {
            let authorization = loaded
                .authorization
                .ok_or_else(|| missing(Relation::Authorization))?;
            let license = loaded.license.ok_or_else(|| missing(Relation::License))?;
            return self
                .visit_account(&loaded.node, &authorization, &license, &mut visited)
                .await;
        }

        let account = loaded.account.ok_or_else(|| missing(Relation::Account))?;
        let account_policy = loaded
            .account_authorization
            .ok_or_else(|| missing(Relation::AccountAuthorization))?;
        let parent_policy = loaded
            .parent_authorization
            .ok_or_else(|| missing(Relation::ParentAuthorization))?;
        let Some(details) = account.account_details() else {
            return Err(missing(Relation::Account));
        };

        let lineage = Lineage {
            root_actor: account.actor_id,
            baseline: details.baseline_plan.clone(),
            account_policy,
        };

        let ancestors = self.ancestors(&loaded.node).await?;
        visited.extend(ancestors.iter().copied());

        self.visit_space(
            *id,
            &parent_policy,
            &lineage,
            &ancestors,
            &mut visited,
            0,
        )
        .await
    }

    /// Computes the overlays of a node and its descendants and persists all of them in one
    /// atomic batch.
    pub async fn propagate_and_save(
        &self,
        id: &NodeId,
    ) -> Result<PropagationResult, DriverError<S, C>> {
        let result = self.propagate(id).await?;

        self.store
            .save_overlays(&result.authorizations, &result.licenses)
            .await
            .map_err(Self::store_error)?;

        debug!(
            node = %id,
            authorizations = result.authorizations.len(),
            licenses = result.licenses.len(),
            "propagation saved"
        );

        Ok(result)
    }

    async fn visit_account(
        &self,
        node: &ResourceNode,
        authorization: &AuthorizationPolicy,
        license: &License,
        visited: &mut HashSet<NodeId>,
    ) -> Result<PropagationResult, DriverError<S, C>> {
        debug!(node = %node.id, "propagating account");
        visited.insert(node.id);

        let resolver = EntitlementResolver::new(self.credentials, self.gateway, self.config);
        let license = resolver
            .resolve_license(node, license, &node.actor_id, None)
            .await?;

        let engine = AuthorizationCascadeEngine::new(self.config);
        let policy = engine.compute_node_policy(
            node,
            authorization,
            PolicyInputs {
                license: Some(&license),
                ..Default::default()
            },
        )?;

        let lineage = Lineage {
            root_actor: node.actor_id,
            baseline: node
                .account_details()
                .map(|details| details.baseline_plan.clone())
                .unwrap_or_default(),
            account_policy: policy.clone(),
        };

        let mut result = PropagationResult::default();
        for child in &node.children {
            let branch =
                Box::pin(self.visit_space(*child, &policy, &lineage, &[], visited, 1)).await?;
            result.extend(branch);
        }

        let mut account_result = PropagationResult::default();
        account_result.push(policy, license);
        account_result.extend(result);

        Ok(account_result)
    }

    async fn visit_space(
        &self,
        id: NodeId,
        parent_policy: &AuthorizationPolicy,
        lineage: &Lineage,
        ancestors: &[NodeId],
        visited: &mut HashSet<NodeId>,
        depth: usize,
    ) -> Result<PropagationResult, DriverError<S, C>> {
        if depth > self.config.max_depth() {
            warn!(node = %id, depth, "maximum propagation depth exceeded, skipping branch");
            return Ok(PropagationResult::default());
        }

        if !visited.insert(id) {
            warn!(node = %id, "node reached twice during propagation, skipping branch");
            return Ok(PropagationResult::default());
        }

        let loaded = self
            .store
            .load_node(&id, RelationSet::OVERLAYS)
            .await
            .map_err(Self::store_error)?
            .ok_or_else(|| Self::not_found(id))?;
        let node = loaded.node;

        if node.is_account() {
            warn!(node = %id, "account listed as child node, skipping branch");
            return Ok(PropagationResult::default());
        }

        debug!(node = %id, depth, "propagating space");

        let missing = |relation| Self::missing(id, relation);
        let authorization = loaded
            .authorization
            .ok_or_else(|| missing(Relation::Authorization))?;
        let license = loaded.license.ok_or_else(|| missing(Relation::License))?;
        let view = self
            .store
            .policy_view(&id)
            .await
            .map_err(Self::store_error)?
            .ok_or_else(|| missing(Relation::CommunityPolicy))?;

        let baseline = matches!(node.kind, NodeKind::SpaceRoot(_)).then_some(&lineage.baseline);
        let resolver = EntitlementResolver::new(self.credentials, self.gateway, self.config);
        let license = resolver
            .resolve_license(&node, &license, &lineage.root_actor, baseline)
            .await?;

        let engine = AuthorizationCascadeEngine::new(self.config);
        let mut policy = engine.compute_node_policy(
            &node,
            &authorization,
            PolicyInputs {
                parent_policy: Some(parent_policy),
                account_policy: Some(&lineage.account_policy),
                policy_view: Some(&view),
                license: Some(&license),
                ancestors,
            },
        )?;

        let mut child_ancestors = ancestors.to_vec();
        child_ancestors.push(id);

        let mut branches = PropagationResult::default();
        for child in &node.children {
            let branch = Box::pin(self.visit_space(
                *child,
                &policy,
                lineage,
                &child_ancestors,
                visited,
                depth + 1,
            ))
            .await?;
            branches.extend(branch);
        }

        if let (NodeKind::Subspace(_), Some(parent_id)) = (&node.kind, node.parent_id) {
            policy.append_credential_rule(AuthorizationCascadeEngine::parent_admin_delete_rule(
                parent_id,
            ));
        }

        let mut result = PropagationResult::default();
        result.push(policy, license);
        result.extend(branches);

        Ok(result)
    }

    /// Space ancestors of a node, root space first.
    async fn ancestors(&self, node: &ResourceNode) -> Result<Vec<NodeId>, DriverError<S, C>> {
        let mut ancestors = Vec::new();
        let mut next = node.parent_id;

        while let Some(parent_id) = next {
            let parent = self
                .store
                .load_node(&parent_id, RelationSet::NONE)
                .await
                .map_err(Self::store_error)?
                .ok_or_else(|| Self::missing(node.id, Relation::Parent))?;

            if parent.node.is_account() {
                break;
            }

            if parent_id == node.id
                || ancestors.contains(&parent_id)
                || ancestors.len() >= self.config.max_depth()
            {
                warn!(node = %node.id, "parent chain is cyclic or too deep, truncating");
                break;
            }

            ancestors.push(parent_id);
            next = parent.node.parent_id;
        }

        ancestors.reverse();
        Ok(ancestors)
    }

    fn store_error(err: <S as PolicyStore>::Error) -> DriverError<S, C> {
        PropagationError::Store(err)
    }

    fn not_found(node: NodeId) -> DriverError<S, C> {
        PropagationError::NodeNotFound(node)
    }

    fn missing(node: NodeId, relation: Relation) -> DriverError<S, C> {
        PropagationError::RelationshipNotFound { node, relation }
    }
}

pub type DriverError<S, C> =
    PropagationError<<S as PolicyStore>::Error, <C as CredentialIndex>::Error>;

#[derive(Debug, Error)]
pub enum PropagationError<SE, CE> {
    #[error("store error: {0}")]
    Store(SE),

    #[error("credential index error: {0}")]
    Credentials(CE),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("{relation} of node {node} not found")]
    RelationshipNotFound { node: NodeId, relation: Relation },

    #[error(transparent)]
    Cascade(#[from] CascadeError),

    #[error("entitlement type {entitlement_type} is not supported on the license of node {node}")]
    UnknownEntitlementType {
        node: NodeId,
        entitlement_type: EntitlementType,
    },
}

impl<SE, CE> From<LicensingError<CE>> for PropagationError<SE, CE> {
    fn from(err: LicensingError<CE>) -> Self {
        match err {
            LicensingError::Credentials(err) => PropagationError::Credentials(err),
            LicensingError::UnknownEntitlementType {
                node,
                entitlement_type,
            } => PropagationError::UnknownEntitlementType {
                node,
                entitlement_type,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use arbor_core::cbor::encode_cbor;
    use arbor_core::traits::{PolicyStore, Relation, RelationSet};
    use arbor_core::{
        Credential, CredentialType, Entitlement, EntitlementDataType, EntitlementType, NodeId,
        PrivacyMode, Privilege, SpaceSettings,
    };
    use arbor_store::MemoryStore;
    use assert_matches::assert_matches;

    use crate::cascade::{SPACE_PARENT_ADMINS_DELETE, SPACE_PLATFORM_SETTINGS};
    use crate::config::Config;
    use crate::test_utils::{MemorySubscriptionGateway, TestTree, setup_logging};

    use super::{PropagationError, TreePropagationDriver};

    #[tokio::test]
    async fn propagation_is_idempotent() {
        setup_logging();

        let store = MemoryStore::new();
        let gateway = MemorySubscriptionGateway::disabled();
        let config = Config::new();
        let tree = TestTree::new(&store).await;
        let space = tree.add_space(&tree.account, SpaceSettings::for_level(0)).await;
        let subspace = tree.add_space(&space, SpaceSettings::for_level(1)).await;
        tree.add_space(&subspace, SpaceSettings::for_level(2)).await;

        let driver = TreePropagationDriver::new(&store, &store, &gateway, &config);
        let first = driver.propagate_and_save(&tree.account.id).await.unwrap();
        let second = driver.propagate_and_save(&tree.account.id).await.unwrap();

        assert_eq!(first.authorizations.len(), 4);
        assert_eq!(first.licenses.len(), 4);
        assert_eq!(
            encode_cbor(&first.authorizations).unwrap(),
            encode_cbor(&second.authorizations).unwrap()
        );
        assert_eq!(
            encode_cbor(&first.licenses).unwrap(),
            encode_cbor(&second.licenses).unwrap()
        );

        // Parents are listed before their descendants.
        assert_eq!(first.authorizations[0].owner, tree.account.id);
        assert_eq!(first.authorizations[1].owner, space.id);
    }

    #[tokio::test]
    async fn non_cascading_rules_stay_local() {
        let store = MemoryStore::new();
        let gateway = MemorySubscriptionGateway::disabled();
        let config = Config::new();
        let tree = TestTree::new(&store).await;
        let space = tree.add_space(&tree.account, SpaceSettings::for_level(0)).await;
        let mut settings = SpaceSettings::for_level(1);
        settings.collaboration.allow_members_to_create_subspaces = true;
        let subspace = tree.add_space(&space, settings).await;
        let nested = tree.add_space(&subspace, SpaceSettings::for_level(2)).await;

        let driver = TreePropagationDriver::new(&store, &store, &gateway, &config);
        let result = driver.propagate(&tree.account.id).await.unwrap();

        let subspace_policy = result.authorization(&subspace.id).unwrap();
        let nested_policy = result.authorization(&nested.id).unwrap();

        // Platform settings rules are generated identically on every space.
        for local in subspace_policy
            .credential_rules
            .iter()
            .filter(|rule| !rule.cascade && rule.tag != SPACE_PLATFORM_SETTINGS)
        {
            assert!(
                !nested_policy.credential_rules.contains(local),
                "local rule {} leaked into descendant",
                local.tag
            );
        }

        // Each subspace carries exactly one delete rule, for its own parent's admins.
        let delete_rules: Vec<_> = nested_policy
            .credential_rules_by_tag(SPACE_PARENT_ADMINS_DELETE)
            .collect();
        assert_eq!(delete_rules.len(), 1);
        assert!(
            delete_rules[0]
                .criteria
                .contains(&Credential::scoped(CredentialType::SpaceAdmin, subspace.id))
        );
        assert_eq!(
            result
                .authorization(&space.id)
                .unwrap()
                .credential_rules_by_tag(SPACE_PARENT_ADMINS_DELETE)
                .count(),
            0
        );
        assert_eq!(
            nested_policy
                .credential_rules_by_tag(SPACE_PLATFORM_SETTINGS)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn private_subspace_inherits_from_account() {
        let store = MemoryStore::new();
        let gateway = MemorySubscriptionGateway::disabled();
        let config = Config::new();
        let tree = TestTree::new(&store).await;
        let space = tree.add_space(&tree.account, SpaceSettings::for_level(0)).await;
        let mut settings = SpaceSettings::for_level(1);
        settings.privacy.mode = PrivacyMode::Private;
        let subspace = tree.add_space(&space, settings).await;

        let driver = TreePropagationDriver::new(&store, &store, &gateway, &config);
        let result = driver.propagate(&tree.account.id).await.unwrap();

        let account_policy = result.authorization(&tree.account.id).unwrap();
        let space_policy = result.authorization(&space.id).unwrap();
        let subspace_policy = result.authorization(&subspace.id).unwrap();

        for rule in space_policy.credential_rules.iter().filter(|rule| rule.cascade) {
            if account_policy.credential_rules.contains(rule) {
                continue;
            }
            assert!(
                !subspace_policy.credential_rules.contains(rule),
                "rule {} copied from parent space",
                rule.tag
            );
        }

        for rule in account_policy.credential_rules.iter().filter(|rule| rule.cascade) {
            assert!(subspace_policy.credential_rules.contains(rule));
        }

        assert!(!subspace_policy.anonymous_read_access);
        assert!(space_policy.anonymous_read_access);
    }

    #[tokio::test]
    async fn cycles_are_cut_and_siblings_complete() {
        setup_logging();

        let store = MemoryStore::new();
        let gateway = MemorySubscriptionGateway::disabled();
        let config = Config::new();
        let tree = TestTree::new(&store).await;
        let space = tree.add_space(&tree.account, SpaceSettings::for_level(0)).await;
        let first = tree.add_space(&space, SpaceSettings::for_level(1)).await;
        let second = tree.add_space(&space, SpaceSettings::for_level(1)).await;
        let nested = tree.add_space(&first, SpaceSettings::for_level(2)).await;

        // Corrupt the tree: the nested subspace lists its own ancestor as a child.
        let mut corrupted = store
            .load_node(&nested.id, RelationSet::NONE)
            .await
            .unwrap()
            .unwrap()
            .node;
        corrupted.children.push(space.id);
        store.update_node(&corrupted).await.unwrap();

        let driver = TreePropagationDriver::new(&store, &store, &gateway, &config);
        let result = driver.propagate(&tree.account.id).await.unwrap();

        assert_eq!(result.authorizations.len(), 5);
        assert!(result.authorization(&second.id).is_some());
        assert!(result.authorization(&nested.id).is_some());
        assert_eq!(
            result
                .authorizations
                .iter()
                .filter(|policy| policy.owner == space.id)
                .count(),
            1
        );

        // Starting below the cycle works as well.
        let result = driver.propagate(&first.id).await.unwrap();
        assert_eq!(result.authorizations.len(), 2);
    }

    #[tokio::test]
    async fn depth_guard_skips_deep_branches() {
        let store = MemoryStore::new();
        let gateway = MemorySubscriptionGateway::disabled();
        let config = Config::new().with_max_depth(2);
        let tree = TestTree::new(&store).await;
        let space = tree.add_space(&tree.account, SpaceSettings::for_level(0)).await;
        let subspace = tree.add_space(&space, SpaceSettings::for_level(1)).await;
        let nested = tree.add_space(&subspace, SpaceSettings::for_level(2)).await;

        let driver = TreePropagationDriver::new(&store, &store, &gateway, &config);
        let result = driver.propagate(&tree.account.id).await.unwrap();

        assert!(result.authorization(&subspace.id).is_some());
        assert!(result.authorization(&nested.id).is_none());
    }

    #[tokio::test]
    async fn subtree_propagation_uses_stored_parent() {
        let store = MemoryStore::new();
        let gateway = MemorySubscriptionGateway::disabled();
        let config = Config::new();
        let tree = TestTree::new(&store).await;
        let space = tree.add_space(&tree.account, SpaceSettings::for_level(0)).await;
        let subspace = tree.add_space(&space, SpaceSettings::for_level(1)).await;

        let driver = TreePropagationDriver::new(&store, &store, &gateway, &config);
        let full = driver.propagate_and_save(&tree.account.id).await.unwrap();
        let partial = driver.propagate(&subspace.id).await.unwrap();

        assert_eq!(partial.authorizations.len(), 1);
        assert_eq!(
            partial.authorization(&subspace.id),
            full.authorization(&subspace.id)
        );
        assert_eq!(partial.license(&subspace.id), full.license(&subspace.id));

        let admins = [Credential::scoped(CredentialType::SpaceAdmin, space.id)];
        assert!(
            partial
                .authorization(&subspace.id)
                .unwrap()
                .has_privilege(&admins, Privilege::Delete)
        );
    }

    #[tokio::test]
    async fn missing_relations_abort_propagation() {
        let store = MemoryStore::new();
        let gateway = MemorySubscriptionGateway::disabled();
        let config = Config::new();
        let tree = TestTree::new(&store).await;
        let space = tree.add_space(&tree.account, SpaceSettings::for_level(0)).await;

        let mut corrupted = store
            .load_node(&space.id, RelationSet::NONE)
            .await
            .unwrap()
            .unwrap()
            .node;
        corrupted.children.push(NodeId::random());
        store.update_node(&corrupted).await.unwrap();

        let driver = TreePropagationDriver::new(&store, &store, &gateway, &config);
        assert_matches!(
            driver.propagate(&tree.account.id).await,
            Err(PropagationError::NodeNotFound(_))
        );
        assert_matches!(
            driver.propagate(&NodeId::random()).await,
            Err(PropagationError::NodeNotFound(_))
        );

        // A license without a matching relation record.
        corrupted.children.clear();
        corrupted.license_id = arbor_core::LicenseId::random();
        store.update_node(&corrupted).await.unwrap();
        assert_matches!(
            driver.propagate(&tree.account.id).await,
            Err(PropagationError::RelationshipNotFound {
                relation: Relation::License,
                ..
            })
        );
    }

    #[tokio::test]
    async fn unknown_space_entitlement_aborts_propagation() {
        let store = MemoryStore::new();
        let gateway = MemorySubscriptionGateway::disabled();
        let config = Config::new();
        let tree = TestTree::new(&store).await;
        let space = tree.add_space(&tree.account, SpaceSettings::for_level(0)).await;

        let loaded = store
            .load_node(&space.id, RelationSet::OVERLAYS)
            .await
            .unwrap()
            .unwrap();
        let mut license = loaded.license.unwrap();
        license.entitlements.push(Entitlement::new(
            EntitlementType::Other("space-flag-unmapped".into()),
            EntitlementDataType::Flag,
        ));
        store.save_overlays(&[], &[license]).await.unwrap();

        let driver = TreePropagationDriver::new(&store, &store, &gateway, &config);
        assert_matches!(
            driver.propagate_and_save(&tree.account.id).await,
            Err(PropagationError::UnknownEntitlementType { node, .. }) if node == space.id
        );
    }
}
