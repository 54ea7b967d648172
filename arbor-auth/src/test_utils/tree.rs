// SPDX-License-Identifier: MIT OR Apache-2.0

use arbor_core::traits::{PolicyStore, RelationSet};
use arbor_core::{
    AccountDetails, AccountType, ActorId, AuthorizationPolicy, BaselineLicensePlan, License,
    LicenseId, NodeId, NodeKind, PolicyId, ResourceNode, SpaceDetails, SpaceSettings,
};
use arbor_store::MemoryStore;

/// Account node with a zero baseline plan, not persisted.
pub fn account_node() -> ResourceNode {
    ResourceNode {
        id: NodeId::random(),
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
    }
}

/// Root space owned by `account`, not persisted.
pub fn root_space_node(account: &ResourceNode) -> ResourceNode {
    space_node(account, account.id, 0, SpaceSettings::for_level(0))
}

/// Subspace nested in `parent`, not persisted.
pub fn subspace_node(parent: &ResourceNode) -> ResourceNode {
    let level = parent.level + 1;
    space_node(parent, parent.account_id(), level, SpaceSettings::for_level(level))
}

fn space_node(
    parent: &ResourceNode,
    account_id: NodeId,
    level: u8,
    settings: SpaceSettings,
) -> ResourceNode {
    let details = SpaceDetails {
        account_id,
        settings,
    };

    ResourceNode {
        id: NodeId::random(),
        kind: if parent.is_account() {
            NodeKind::SpaceRoot(details)
        } else {
            NodeKind::Subspace(details)
        },
        level,
        parent_id: Some(parent.id),
        children: Vec::new(),
        actor_id: ActorId::random(),
        authorization_id: PolicyId::random(),
        license_id: LicenseId::random(),
    }
}

/// Builds node trees directly in a [`MemoryStore`], bypassing any propagation.
pub struct TestTree {
    store: MemoryStore,
    pub account: ResourceNode,
}

impl TestTree {
    pub async fn new(store: &MemoryStore) -> Self {
        let account = account_node();
        store
            .insert_node(
                &account,
                &AuthorizationPolicy::new(account.authorization_id, account.id),
                &License::account(account.license_id, account.id),
            )
            .await
            .expect("infallible");

        Self {
            store: store.clone(),
            account,
        }
    }

    /// Adds a space below `parent` and registers it as the parent's last child.
    pub async fn add_space(&self, parent: &ResourceNode, settings: SpaceSettings) -> ResourceNode {
        let level = if parent.is_account() {
            0
        } else {
            parent.level + 1
        };
        let node = space_node(parent, parent.account_id(), level, settings);

        self.store
            .insert_node(
                &node,
                &AuthorizationPolicy::new(node.authorization_id, node.id),
                &License::space(node.license_id, node.id),
            )
            .await
            .expect("infallible");

        let mut parent = self
            .store
            .load_node(&parent.id, RelationSet::NONE)
            .await
            .expect("infallible")
            .expect("parent exists")
            .node;
        parent.children.push(node.id);
        self.store.update_node(&parent).await.expect("infallible");

        node
    }
}
