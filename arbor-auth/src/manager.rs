// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeSet, HashSet};

use arbor_core::traits::{
    CommunityPolicyResolver, CredentialIndex, LoadedNode, PolicyStore, Relation, RelationSet,
    SubscriptionGateway,
};
use arbor_core::{
    AccountDetails, AccountType, ActorId, AuthorizationPolicy, Credential, CredentialType,
    License, LicenseId, NodeId, NodeKind, PolicyId, Privilege, ResourceNode, SpaceDetails,
    SpaceSettings, Visibility,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::driver::{PropagationError, PropagationResult, TreePropagationDriver};

/// Create and manage accounts, spaces and subspaces.
///
/// Every operation changing policy-relevant state finishes with a propagation run from the
/// affected node. Runs are serialized, a second operation waits until the overlays of the first
/// one have been persisted.
pub struct Manager<S, C, G> {
    store: S,
    credentials: C,
    gateway: G,
    config: Config,
    propagation: Mutex<()>,
}

impl<S, C, G> Manager<S, C, G>
where
    S: PolicyStore + CommunityPolicyResolver<Error = <S as PolicyStore>::Error>,
    C: CredentialIndex,
    G: SubscriptionGateway,
{
    pub fn new(store: S, credentials: C, gateway: G, config: Config) -> Self {
        Self {
            store,
            credentials,
            gateway,
            config,
            propagation: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates an account with the configured default plan and all six account entitlements
    /// switched off. The optional host becomes the account's admin.
    pub async fn create_account(
        &self,
        account_type: AccountType,
        host: Option<ActorId>,
    ) -> Result<ResourceNode, OperationError<S, C>> {
        let node = ResourceNode {
            id: NodeId::random(),
            kind: NodeKind::Account(AccountDetails {
                account_type,
                baseline_plan: self.config.default_baseline_plan().clone(),
                external_subscription_id: None,
            }),
            level: 0,
            parent_id: None,
            children: Vec::new(),
            actor_id: ActorId::random(),
            authorization_id: PolicyId::random(),
            license_id: LicenseId::random(),
        };

        let _guard = self.propagation.lock().await;

        self.store
            .insert_node(
                &node,
                &AuthorizationPolicy::new(node.authorization_id, node.id),
                &License::account(node.license_id, node.id),
            )
            .await
            .map_err(Self::store_error)?;

        if let Some(host) = host {
            self.credentials
                .assign_credential(
                    &host,
                    Credential::scoped(CredentialType::AccountAdmin, node.id),
                )
                .await
                .map_err(Self::credentials_error)?;
        }

        debug!(account = %node.id, ?account_type, "created account");

        self.propagate_locked(&node.id).await?;
        Ok(node)
    }

    /// Creates a root space owned by `account_id`.
    pub async fn create_space(
        &self,
        account_id: &NodeId,
        settings: Option<SpaceSettings>,
    ) -> Result<ResourceNode, OperationError<S, C>> {
        let _guard = self.propagation.lock().await;

        let mut account = self.load(account_id, RelationSet::NONE).await?.node;
        if !account.is_account() {
            return Err(ManagerError::NotAnAccount(*account_id));
        }

        let node = ResourceNode {
            id: NodeId::random(),
            kind: NodeKind::SpaceRoot(SpaceDetails {
                account_id: account.id,
                settings: settings.unwrap_or_else(|| SpaceSettings::for_level(0)),
            }),
            level: 0,
            parent_id: Some(account.id),
            children: Vec::new(),
            actor_id: ActorId::random(),
            authorization_id: PolicyId::random(),
            license_id: LicenseId::random(),
        };

        self.insert_child(&mut account, &node).await?;
        debug!(space = %node.id, account = %account.id, "created space");

        self.propagate_locked(&node.id).await?;
        Ok(node)
    }

    /// Creates a subspace below another space, one level deeper than its parent.
    pub async fn create_subspace(
        &self,
        parent_id: &NodeId,
        settings: Option<SpaceSettings>,
    ) -> Result<ResourceNode, OperationError<S, C>> {
        let _guard = self.propagation.lock().await;

        let mut parent = self.load(parent_id, RelationSet::NONE).await?.node;
        if parent.is_account() {
            return Err(ManagerError::NotASpace(*parent_id));
        }

        let level = parent.level + 1;
        if level > self.config.max_space_level() {
            return Err(ManagerError::MaxLevelExceeded {
                parent: *parent_id,
                max: self.config.max_space_level(),
            });
        }

        let node = ResourceNode {
            id: NodeId::random(),
            kind: NodeKind::Subspace(SpaceDetails {
                account_id: parent.account_id(),
                settings: settings.unwrap_or_else(|| SpaceSettings::for_level(level)),
            }),
            level,
            parent_id: Some(parent.id),
            children: Vec::new(),
            actor_id: ActorId::random(),
            authorization_id: PolicyId::random(),
            license_id: LicenseId::random(),
        };

        self.insert_child(&mut parent, &node).await?;
        debug!(subspace = %node.id, parent = %parent.id, level, "created subspace");

        self.propagate_locked(&node.id).await?;
        Ok(node)
    }

    /// Replaces the settings of a space.
    ///
    /// Returns true if the change required a propagation run.
    pub async fn update_space_settings(
        &self,
        space_id: &NodeId,
        settings: SpaceSettings,
    ) -> Result<bool, OperationError<S, C>> {
        let _guard = self.propagation.lock().await;

        let mut node = self.load(space_id, RelationSet::NONE).await?.node;
        let details = node
            .space_details_mut()
            .ok_or_else(|| Self::not_a_space(*space_id))?;

        let requires_update = details.settings.requires_policy_update(&settings);
        details.settings = settings;
        self.store
            .update_node(&node)
            .await
            .map_err(Self::store_error)?;

        if requires_update {
            self.propagate_locked(space_id).await?;
        } else {
            debug!(space = %space_id, "settings change does not affect authorization");
        }

        Ok(requires_update)
    }

    /// Moves a space into another lifecycle state.
    pub async fn update_visibility(
        &self,
        space_id: &NodeId,
        visibility: Visibility,
    ) -> Result<(), OperationError<S, C>> {
        let _guard = self.propagation.lock().await;

        let loaded = self.load(space_id, RelationSet::OVERLAYS).await?;
        if loaded.node.is_account() {
            return Err(ManagerError::NotASpace(*space_id));
        }

        let mut license = loaded
            .license
            .ok_or_else(|| Self::missing(*space_id, Relation::License))?;
        license.visibility = visibility;
        self.store
            .save_overlays(&[], &[license])
            .await
            .map_err(Self::store_error)?;

        self.propagate_locked(space_id).await?;
        Ok(())
    }

    /// Hands a credential to an actor.
    ///
    /// If the actor belongs to a node of the tree, the node is propagated again. Returns false
    /// if the actor already held the credential.
    pub async fn grant_credential(
        &self,
        actor: &ActorId,
        credential: Credential,
    ) -> Result<bool, OperationError<S, C>> {
        let _guard = self.propagation.lock().await;

        let assigned = self
            .credentials
            .assign_credential(actor, credential)
            .await
            .map_err(Self::credentials_error)?;

        if assigned {
            self.propagate_actor(actor).await?;
        }

        Ok(assigned)
    }

    /// Takes a credential away from an actor.
    ///
    /// Returns false if the actor did not hold the credential.
    pub async fn revoke_credential(
        &self,
        actor: &ActorId,
        credential: &Credential,
    ) -> Result<bool, OperationError<S, C>> {
        let _guard = self.propagation.lock().await;

        let removed = self
            .credentials
            .remove_credential(actor, credential)
            .await
            .map_err(Self::credentials_error)?;

        if removed {
            self.propagate_actor(actor).await?;
        }

        Ok(removed)
    }

    /// Links or unlinks an account with an external subscription.
    pub async fn set_external_subscription(
        &self,
        account_id: &NodeId,
        subscription_id: Option<String>,
    ) -> Result<(), OperationError<S, C>> {
        let _guard = self.propagation.lock().await;

        let mut account = self.load(account_id, RelationSet::NONE).await?.node;
        let details = account
            .account_details_mut()
            .ok_or_else(|| Self::not_an_account(*account_id))?;
        details.external_subscription_id = subscription_id;
        self.store
            .update_node(&account)
            .await
            .map_err(Self::store_error)?;

        self.propagate_locked(account_id).await?;
        Ok(())
    }

    /// Pulls the current state of the account's external subscription into its license.
    pub async fn sync_subscription(
        &self,
        account_id: &NodeId,
    ) -> Result<PropagationResult, OperationError<S, C>> {
        let _guard = self.propagation.lock().await;

        let account = self.load(account_id, RelationSet::NONE).await?.node;
        if !account.is_account() {
            return Err(ManagerError::NotAnAccount(*account_id));
        }

        self.propagate_locked(account_id).await
    }

    /// Recomputes and persists the overlays of a node and its descendants.
    pub async fn propagate(
        &self,
        id: &NodeId,
    ) -> Result<PropagationResult, OperationError<S, C>> {
        let _guard = self.propagation.lock().await;
        self.propagate_locked(id).await
    }

    /// Deletes a space together with all of its subspaces.
    ///
    /// Returns the ids of all removed nodes.
    pub async fn delete_space(&self, space_id: &NodeId) -> Result<Vec<NodeId>, OperationError<S, C>> {
        let _guard = self.propagation.lock().await;

        let node = self.load(space_id, RelationSet::NONE).await?.node;
        if node.is_account() {
            return Err(ManagerError::NotASpace(*space_id));
        }

        // Detach from the parent before removing the subtree.
        if let Some(parent_id) = node.parent_id {
            if let Some(loaded) = self
                .store
                .load_node(&parent_id, RelationSet::NONE)
                .await
                .map_err(Self::store_error)?
            {
                let mut parent = loaded.node;
                parent.children.retain(|child| child != space_id);
                self.store
                    .update_node(&parent)
                    .await
                    .map_err(Self::store_error)?;
            }
        }

        let mut removed = Vec::new();
        let mut visited = HashSet::from([node.id]);
        let mut stack = vec![node];

        while let Some(current) = stack.pop() {
            for child in &current.children {
                if !visited.insert(*child) {
                    warn!(node = %current.id, child = %child, "child reached twice, not deleting it");
                    continue;
                }

                let Some(loaded) = self
                    .store
                    .load_node(child, RelationSet::NONE)
                    .await
                    .map_err(Self::store_error)?
                else {
                    continue;
                };

                // Only nested subspaces owned by this node belong to the subtree.
                let owned = matches!(loaded.node.kind, NodeKind::Subspace(_))
                    && loaded.node.parent_id == Some(current.id);
                if !owned {
                    warn!(
                        node = %current.id,
                        child = %child,
                        "child is not a subspace of this node, not deleting it"
                    );
                    continue;
                }

                stack.push(loaded.node);
            }

            self.store
                .delete_node(&current.id)
                .await
                .map_err(Self::store_error)?;
            removed.push(current.id);
        }

        debug!(space = %space_id, removed = removed.len(), "deleted space");

        Ok(removed)
    }

    pub async fn node(&self, id: &NodeId) -> Result<Option<ResourceNode>, OperationError<S, C>> {
        Ok(self
            .store
            .load_node(id, RelationSet::NONE)
            .await
            .map_err(Self::store_error)?
            .map(|loaded| loaded.node))
    }

    pub async fn authorization(
        &self,
        id: &NodeId,
    ) -> Result<Option<AuthorizationPolicy>, OperationError<S, C>> {
        Ok(self
            .store
            .load_node(id, RelationSet::OVERLAYS)
            .await
            .map_err(Self::store_error)?
            .and_then(|loaded| loaded.authorization))
    }

    pub async fn license(&self, id: &NodeId) -> Result<Option<License>, OperationError<S, C>> {
        Ok(self
            .store
            .load_node(id, RelationSet::OVERLAYS)
            .await
            .map_err(Self::store_error)?
            .and_then(|loaded| loaded.license))
    }

    /// Privileges an actor holds on a node, `None` stands for an anonymous visitor.
    pub async fn privileges(
        &self,
        actor: Option<&ActorId>,
        id: &NodeId,
    ) -> Result<BTreeSet<Privilege>, OperationError<S, C>> {
        let authorization = self
            .load(id, RelationSet::OVERLAYS)
            .await?
            .authorization
            .ok_or_else(|| Self::missing(*id, Relation::Authorization))?;

        let credentials = match actor {
            Some(actor) => self
                .credentials
                .credentials(actor)
                .await
                .map_err(Self::credentials_error)?,
            None => Vec::new(),
        };

        Ok(authorization.granted_privileges(&credentials))
    }

    pub async fn has_privilege(
        &self,
        actor: Option<&ActorId>,
        id: &NodeId,
        privilege: Privilege,
    ) -> Result<bool, OperationError<S, C>> {
        Ok(self.privileges(actor, id).await?.contains(&privilege))
    }

    fn driver(&self) -> TreePropagationDriver<'_, S, C, G> {
        TreePropagationDriver::new(&self.store, &self.credentials, &self.gateway, &self.config)
    }

    async fn propagate_locked(
        &self,
        id: &NodeId,
    ) -> Result<PropagationResult, OperationError<S, C>> {
        Ok(self.driver().propagate_and_save(id).await?)
    }

    async fn propagate_actor(&self, actor: &ActorId) -> Result<(), OperationError<S, C>> {
        let node = self
            .store
            .node_by_actor(actor)
            .await
            .map_err(Self::store_error)?;

        if let Some(id) = node {
            self.propagate_locked(&id).await?;
        }

        Ok(())
    }

    async fn load(
        &self,
        id: &NodeId,
        relations: RelationSet,
    ) -> Result<LoadedNode, OperationError<S, C>> {
        self.store
            .load_node(id, relations)
            .await
            .map_err(Self::store_error)?
            .ok_or(ManagerError::NodeNotFound(*id))
    }

    async fn insert_child(
        &self,
        parent: &mut ResourceNode,
        node: &ResourceNode,
    ) -> Result<(), OperationError<S, C>> {
        self.store
            .insert_node(
                node,
                &AuthorizationPolicy::new(node.authorization_id, node.id),
                &License::space(node.license_id, node.id),
            )
            .await
            .map_err(Self::store_error)?;

        parent.children.push(node.id);
        self.store
            .update_node(parent)
            .await
            .map_err(Self::store_error)
    }

    fn store_error(err: <S as PolicyStore>::Error) -> OperationError<S, C> {
        ManagerError::Store(err)
    }

    fn credentials_error(err: C::Error) -> OperationError<S, C> {
        ManagerError::Credentials(err)
    }

    fn not_a_space(id: NodeId) -> OperationError<S, C> {
        ManagerError::NotASpace(id)
    }

    fn not_an_account(id: NodeId) -> OperationError<S, C> {
        ManagerError::NotAnAccount(id)
    }

    fn missing(node: NodeId, relation: Relation) -> OperationError<S, C> {
        ManagerError::RelationshipNotFound { node, relation }
    }
}

pub type OperationError<S, C> =
    ManagerError<<S as PolicyStore>::Error, <C as CredentialIndex>::Error>;

#[derive(Debug, Error)]
pub enum ManagerError<SE, CE> {
    #[error(transparent)]
    Propagation(PropagationError<SE, CE>),

    #[error("store error: {0}")]
    Store(SE),

    #[error("credential index error: {0}")]
    Credentials(CE),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("{relation} of node {node} not found")]
    RelationshipNotFound { node: NodeId, relation: Relation },

    #[error("node {0} is not a space")]
    NotASpace(NodeId),

    #[error("node {0} is not an account")]
    NotAnAccount(NodeId),

    #[error("subspace of {parent} would exceed the maximum space level {max}")]
    MaxLevelExceeded { parent: NodeId, max: u8 },
}

impl<SE, CE> From<PropagationError<SE, CE>> for ManagerError<SE, CE> {
    fn from(err: PropagationError<SE, CE>) -> Self {
        ManagerError::Propagation(err)
    }
}
