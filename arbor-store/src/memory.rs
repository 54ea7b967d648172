// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory store, shared between clones.
use std::collections::{BTreeSet, HashMap};
use std::convert::Infallible;
use std::sync::Arc;

use arbor_core::traits::{
    CommunityPolicyResolver, CredentialIndex, LoadedNode, PolicyStore, RelationSet,
};
use arbor_core::{
    ActorId, AuthorizationPolicy, CommunityPolicyView, Credential, CredentialCriterion,
    EntitlementType, GrantedEntitlement, License, LicenseId, LicensingFramework, NodeId,
    PolicyId, ResourceNode,
};
use tokio::sync::RwLock;
use tracing::trace;

#[derive(Debug)]
struct MemoryStoreInner {
    nodes: HashMap<NodeId, ResourceNode>,
    authorizations: HashMap<PolicyId, AuthorizationPolicy>,
    licenses: HashMap<LicenseId, License>,
    credentials: HashMap<ActorId, BTreeSet<Credential>>,
    framework: LicensingFramework,
}

impl MemoryStoreInner {
    fn load(&self, id: &NodeId, relations: RelationSet) -> Option<LoadedNode> {
        let node = self.nodes.get(id)?.clone();
        let mut loaded = LoadedNode::new(node);

        if relations.authorization {
            loaded.authorization = self
                .authorizations
                .get(&loaded.node.authorization_id)
                .cloned();
        }

        if relations.license {
            loaded.license = self.licenses.get(&loaded.node.license_id).cloned();
        }

        if relations.parent || relations.parent_authorization {
            let parent = loaded
                .node
                .parent_id
                .and_then(|parent_id| self.nodes.get(&parent_id));

            if relations.parent_authorization {
                loaded.parent_authorization = parent
                    .and_then(|parent| self.authorizations.get(&parent.authorization_id))
                    .cloned();
            }

            if relations.parent {
                loaded.parent = parent.cloned();
            }
        }

        if (relations.account || relations.account_authorization) && !loaded.node.is_account() {
            let account = self.nodes.get(&loaded.node.account_id());

            if relations.account_authorization {
                loaded.account_authorization = account
                    .and_then(|account| self.authorizations.get(&account.authorization_id))
                    .cloned();
            }

            if relations.account {
                loaded.account = account.cloned();
            }
        }

        Some(loaded)
    }
}

/// Store keeping all state in memory behind a shared lock.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_framework(LicensingFramework::default())
    }

    /// Store resolving credential grants against a custom licensing catalog.
    pub fn with_framework(framework: LicensingFramework) -> Self {
        let inner = MemoryStoreInner {
            nodes: HashMap::new(),
            authorizations: HashMap::new(),
            licenses: HashMap::new(),
            credentials: HashMap::new(),
            framework,
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Number of stored authorization policies.
    pub async fn authorizations_len(&self) -> usize {
        self.inner.read().await.authorizations.len()
    }

    /// Number of stored licenses.
    pub async fn licenses_len(&self) -> usize {
        self.inner.read().await.licenses.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyStore for MemoryStore {
    type Error = Infallible;

    async fn load_node(
        &self,
        id: &NodeId,
        relations: RelationSet,
    ) -> Result<Option<LoadedNode>, Self::Error> {
        let inner = self.inner.read().await;
        Ok(inner.load(id, relations))
    }

    async fn node_by_actor(&self, actor: &ActorId) -> Result<Option<NodeId>, Self::Error> {
        let inner = self.inner.read().await;
        Ok(inner
            .nodes
            .values()
            .find(|node| &node.actor_id == actor)
            .map(|node| node.id))
    }

    async fn insert_node(
        &self,
        node: &ResourceNode,
        authorization: &AuthorizationPolicy,
        license: &License,
    ) -> Result<(), Self::Error> {
        let mut inner = self.inner.write().await;
        inner.nodes.insert(node.id, node.clone());
        inner
            .authorizations
            .insert(authorization.id, authorization.clone());
        inner.licenses.insert(license.id, license.clone());
        Ok(())
    }

    async fn update_node(&self, node: &ResourceNode) -> Result<(), Self::Error> {
        let mut inner = self.inner.write().await;
        inner.nodes.insert(node.id, node.clone());
        Ok(())
    }

    async fn save_overlays(
        &self,
        authorizations: &[AuthorizationPolicy],
        licenses: &[License],
    ) -> Result<(), Self::Error> {
        // One write guard for the whole batch, readers never observe a partial update.
        let mut inner = self.inner.write().await;

        for authorization in authorizations {
            inner
                .authorizations
                .insert(authorization.id, authorization.clone());
        }

        for license in licenses {
            inner.licenses.insert(license.id, license.clone());
        }

        trace!(
            authorizations = authorizations.len(),
            licenses = licenses.len(),
            "saved overlays"
        );

        Ok(())
    }

    async fn delete_node(&self, id: &NodeId) -> Result<(), Self::Error> {
        let mut inner = self.inner.write().await;
        if let Some(node) = inner.nodes.remove(id) {
            inner.authorizations.remove(&node.authorization_id);
            inner.licenses.remove(&node.license_id);
        }
        Ok(())
    }
}

impl CredentialIndex for MemoryStore {
    type Error = Infallible;

    async fn credentials(&self, actor: &ActorId) -> Result<Vec<Credential>, Self::Error> {
        let inner = self.inner.read().await;
        Ok(inner
            .credentials
            .get(actor)
            .map(|credentials| credentials.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn has_credential(
        &self,
        actor: &ActorId,
        criterion: &CredentialCriterion,
    ) -> Result<bool, Self::Error> {
        let inner = self.inner.read().await;
        Ok(inner
            .credentials
            .get(actor)
            .is_some_and(|credentials| credentials.iter().any(|held| criterion.matches(held))))
    }

    async fn granted_entitlement(
        &self,
        entitlement_type: &EntitlementType,
        actor: &ActorId,
    ) -> Result<Option<GrantedEntitlement>, Self::Error> {
        let inner = self.inner.read().await;
        let credentials: Vec<Credential> = inner
            .credentials
            .get(actor)
            .map(|credentials| credentials.iter().copied().collect())
            .unwrap_or_default();
        Ok(inner
            .framework
            .granted_entitlement(entitlement_type, &credentials))
    }

    async fn assign_credential(
        &self,
        actor: &ActorId,
        credential: Credential,
    ) -> Result<bool, Self::Error> {
        let mut inner = self.inner.write().await;
        Ok(inner.credentials.entry(*actor).or_default().insert(credential))
    }

    async fn remove_credential(
        &self,
        actor: &ActorId,
        credential: &Credential,
    ) -> Result<bool, Self::Error> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .credentials
            .get_mut(actor)
            .is_some_and(|credentials| credentials.remove(credential)))
    }
}

impl CommunityPolicyResolver for MemoryStore {
    type Error = Infallible;

    async fn policy_view(&self, node_id: &NodeId) -> Result<Option<CommunityPolicyView>, Self::Error> {
        let inner = self.inner.read().await;
        Ok(inner
            .nodes
            .get(node_id)
            .and_then(|node| node.space_details())
            .map(|details| CommunityPolicyView::from(&details.settings)))
    }
}

#[cfg(test)]
mod tests {
    use arbor_core::traits::{
        CommunityPolicyResolver, CredentialIndex, PolicyStore, RelationSet,
    };
    use arbor_core::{
        AccountDetails, AccountType, ActorId, AuthorizationPolicy, BaselineLicensePlan,
        Credential, CredentialType, EntitlementType, License, LicenseId, NodeId, NodeKind,
        PolicyId, ResourceNode, SpaceDetails, SpaceSettings,
    };

    use super::MemoryStore;

    fn account() -> (ResourceNode, AuthorizationPolicy, License) {
        let id = NodeId::random();
        let node = ResourceNode {
            id,
            kind: NodeKind::Account(AccountDetails {
                account_type: AccountType::User,
                baseline_plan: BaselineLicensePlan::default(),
                external_subscription_id: None,
            }),
            level: 0,
            parent_id: None,
            children: Vec::new(),
            actor_id: ActorId::random(),
            authorization_id: PolicyId::random(),
            license_id: LicenseId::random(),
        };
        let authorization = AuthorizationPolicy::new(node.authorization_id, id);
        let license = License::account(node.license_id, id);
        (node, authorization, license)
    }

    fn space(account: &ResourceNode) -> (ResourceNode, AuthorizationPolicy, License) {
        let id = NodeId::random();
        let node = ResourceNode {
            id,
            kind: NodeKind::SpaceRoot(SpaceDetails {
                account_id: account.id,
                settings: SpaceSettings::for_level(0),
            }),
            level: 0,
            parent_id: Some(account.id),
            children: Vec::new(),
            actor_id: ActorId::random(),
            authorization_id: PolicyId::random(),
            license_id: LicenseId::random(),
        };
        let authorization = AuthorizationPolicy::new(node.authorization_id, id);
        let license = License::space(node.license_id, id);
        (node, authorization, license)
    }

    #[tokio::test]
    async fn load_with_relations() {
        let store = MemoryStore::new();
        let (account, account_policy, account_license) = account();
        let (space, space_policy, space_license) = space(&account);
        store
            .insert_node(&account, &account_policy, &account_license)
            .await
            .unwrap();
        store
            .insert_node(&space, &space_policy, &space_license)
            .await
            .unwrap();

        let loaded = store
            .load_node(&space.id, RelationSet::NONE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.node, space);
        assert!(loaded.authorization.is_none());
        assert!(loaded.account.is_none());

        let loaded = store
            .load_node(&space.id, RelationSet::ALL)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.authorization, Some(space_policy));
        assert_eq!(loaded.license, Some(space_license));
        assert_eq!(loaded.parent, Some(account.clone()));
        assert_eq!(loaded.parent_authorization, Some(account_policy.clone()));
        assert_eq!(loaded.account, Some(account.clone()));
        assert_eq!(loaded.account_authorization, Some(account_policy));

        assert!(
            store
                .load_node(&NodeId::random(), RelationSet::ALL)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(
            store.node_by_actor(&space.actor_id).await.unwrap(),
            Some(space.id)
        );
    }

    #[tokio::test]
    async fn delete_removes_overlays() {
        let store = MemoryStore::new();
        let (account, policy, license) = account();
        store.insert_node(&account, &policy, &license).await.unwrap();
        assert_eq!(store.authorizations_len().await, 1);

        store.delete_node(&account.id).await.unwrap();
        assert_eq!(store.authorizations_len().await, 0);
        assert_eq!(store.licenses_len().await, 0);
        assert!(
            store
                .load_node(&account.id, RelationSet::NONE)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn credentials_and_grants() {
        let store = MemoryStore::new();
        let actor = ActorId::random();
        let plus = Credential::global(CredentialType::AccountLicensePlus);

        assert!(store.assign_credential(&actor, plus).await.unwrap());
        assert!(!store.assign_credential(&actor, plus).await.unwrap());
        assert!(store.has_credential(&actor, &plus).await.unwrap());

        let granted = store
            .granted_entitlement(&EntitlementType::AccountVirtualContributor, &actor)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(granted.limit, 3);

        assert!(store.remove_credential(&actor, &plus).await.unwrap());
        assert!(!store.remove_credential(&actor, &plus).await.unwrap());
        assert!(store.credentials(&actor).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn policy_view_only_for_spaces() {
        let store = MemoryStore::new();
        let (account, account_policy, account_license) = account();
        let (space, space_policy, space_license) = space(&account);
        store
            .insert_node(&account, &account_policy, &account_license)
            .await
            .unwrap();
        store
            .insert_node(&space, &space_policy, &space_license)
            .await
            .unwrap();

        assert!(store.policy_view(&account.id).await.unwrap().is_none());
        assert!(store.policy_view(&space.id).await.unwrap().is_some());
    }
}
