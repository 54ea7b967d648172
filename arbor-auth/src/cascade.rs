// SPDX-License-Identifier: MIT OR Apache-2.0

//! Computes the authorization overlay of a single node.
//!
//! Every pass starts from an empty policy with the node's policy identity, copies the cascading
//! rules of the inheritance source and then extends it with the node's local rules:
//!
//! ```text
//! account ── anonymous read, platform and account admin rules
//!   └─ root space ── inherits from account
//!        ├─ public subspace ── inherits from its parent space
//!        └─ private subspace ── inherits from account, ancestor admins added locally
//! ```
use arbor_core::traits::Relation;
use arbor_core::{
    AuthorizationPolicy, CommunityPolicyView, Credential, CredentialRule, CredentialType,
    License, NodeId, NodeKind, Privilege, PrivilegeRule, ResourceNode, Visibility,
};
use thiserror::Error;
use tracing::trace;

use crate::config::{Config, GlobalRole};

pub const ACCOUNT_GLOBAL_ADMIN_MANAGE: &str = "account-global-admin-manage";
pub const ACCOUNT_GLOBAL_SPACES_READ: &str = "account-global-spaces-read";
pub const ACCOUNT_GLOBAL_COMMUNITY_READ: &str = "account-global-community-read";
pub const ACCOUNT_GLOBAL_ADMIN_GRANT: &str = "account-global-admin-grant";
pub const ACCOUNT_RESOURCE_TRANSFER: &str = "account-resource-transfer";
pub const ACCOUNT_LICENSE_MANAGE: &str = "account-license-manage";
pub const ACCOUNT_ADMIN_MANAGE: &str = "account-admin-manage";
pub const ACCOUNT_ADMIN_CREATE: &str = "account-admin-create";

pub const SPACE_MEMBERS_READ: &str = "space-members-read";
pub const SPACE_ADMINS: &str = "space-admins";
pub const SPACE_PLATFORM_SETTINGS: &str = "space-platform-settings";
pub const SPACE_MEMBERS_NOTIFICATIONS: &str = "space-members-notifications";
pub const SPACE_MEMBERS_CREATE_SUBSPACE: &str = "space-members-create-subspace";
pub const SPACE_PRIVATE_SUBSPACE_ADMINS: &str = "space-private-subspace-admins";
pub const SPACE_PARENT_ADMINS_DELETE: &str = "space-parent-admins-delete";
pub const SPACE_READ_IMPLIES: &str = "space-read-implies";
pub const SPACE_CREATE_IMPLIES: &str = "space-create-implies";

const ADMIN_PRIVILEGES: [Privilege; 5] = [
    Privilege::Create,
    Privilege::Read,
    Privilege::Update,
    Privilege::Delete,
    Privilege::Grant,
];

/// Related state a node's policy is computed from.
///
/// Accounts need none of it, spaces need the community view, their license and the account
/// policy. Public subspaces additionally need the freshly computed policy of their parent.
#[derive(Clone, Copy, Debug, Default)]
pub struct PolicyInputs<'a> {
    pub parent_policy: Option<&'a AuthorizationPolicy>,
    pub account_policy: Option<&'a AuthorizationPolicy>,
    pub policy_view: Option<&'a CommunityPolicyView>,
    pub license: Option<&'a License>,

    /// Ancestor spaces of the node, root space first.
    pub ancestors: &'a [NodeId],
}

#[derive(Clone, Debug)]
pub struct AuthorizationCascadeEngine<'a> {
    config: &'a Config,
}

impl<'a> AuthorizationCascadeEngine<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Builds a new policy for `node`, keeping the identity of `current`.
    ///
    /// Nothing of `current` besides its identity influences the result.
    pub fn compute_node_policy(
        &self,
        node: &ResourceNode,
        current: &AuthorizationPolicy,
        inputs: PolicyInputs<'_>,
    ) -> Result<AuthorizationPolicy, CascadeError> {
        let policy = match &node.kind {
            NodeKind::Account(_) => self.account_policy(node, current),
            NodeKind::SpaceRoot(_) | NodeKind::Subspace(_) => {
                self.space_policy(node, current, inputs)?
            }
        };

        trace!(
            node = %node.id,
            credential_rules = policy.credential_rules.len(),
            anonymous_read_access = policy.anonymous_read_access,
            "computed authorization policy"
        );

        Ok(policy)
    }

    /// Non-cascading rule allowing admins of `parent` to delete one of its subspaces.
    pub fn parent_admin_delete_rule(parent: NodeId) -> CredentialRule {
        CredentialRule::new(
            SPACE_PARENT_ADMINS_DELETE,
            [Privilege::Delete],
            [Credential::scoped(CredentialType::SpaceAdmin, parent)],
            false,
        )
    }

    fn account_policy(&self, node: &ResourceNode, current: &AuthorizationPolicy) -> AuthorizationPolicy {
        let mut policy = current.reset();
        policy.anonymous_read_access = true;

        let account_admin = Credential::scoped(CredentialType::AccountAdmin, node.id);
        let platform_managers = self.global_credentials(&[
            GlobalRole::Admin,
            GlobalRole::LicenseManager,
            GlobalRole::Support,
        ]);

        append_rule(
            &mut policy,
            ACCOUNT_GLOBAL_ADMIN_MANAGE,
            &[
                Privilege::AuthorizationReset,
                Privilege::LicenseReset,
                Privilege::PlatformAdmin,
                Privilege::CreateSpace,
                Privilege::CreateVirtualContributor,
                Privilege::CreateInnovationPack,
                Privilege::CreateInnovationHub,
                Privilege::Read,
                Privilege::Update,
                Privilege::Delete,
            ],
            platform_managers,
            false,
        );

        append_rule(
            &mut policy,
            ACCOUNT_GLOBAL_SPACES_READ,
            &[Privilege::Read],
            self.global_credentials(&[GlobalRole::SpacesReader]),
            true,
        );

        append_rule(
            &mut policy,
            ACCOUNT_GLOBAL_COMMUNITY_READ,
            &[Privilege::Read],
            self.global_credentials(&[GlobalRole::CommunityReader]),
            true,
        );

        append_rule(
            &mut policy,
            ACCOUNT_GLOBAL_ADMIN_GRANT,
            &[Privilege::Grant],
            self.global_credentials(&[GlobalRole::Admin]),
            true,
        );

        let mut transfer = self.global_credentials(&[GlobalRole::Admin, GlobalRole::Support]);
        transfer.push(account_admin);
        append_rule(
            &mut policy,
            ACCOUNT_RESOURCE_TRANSFER,
            &[
                Privilege::TransferResourceOffer,
                Privilege::TransferResourceAccept,
            ],
            transfer,
            false,
        );

        append_rule(
            &mut policy,
            ACCOUNT_LICENSE_MANAGE,
            &[Privilege::AccountLicenseManage],
            self.global_credentials(&[GlobalRole::Admin, GlobalRole::LicenseManager]),
            false,
        );

        append_rule(
            &mut policy,
            ACCOUNT_ADMIN_MANAGE,
            &[
                Privilege::Create,
                Privilege::Read,
                Privilege::Update,
                Privilege::Delete,
            ],
            vec![account_admin],
            true,
        );

        append_rule(
            &mut policy,
            ACCOUNT_ADMIN_CREATE,
            &[
                Privilege::CreateSpace,
                Privilege::CreateVirtualContributor,
                Privilege::CreateInnovationPack,
                Privilege::CreateInnovationHub,
            ],
            vec![account_admin],
            false,
        );

        policy
    }

    fn space_policy(
        &self,
        node: &ResourceNode,
        current: &AuthorizationPolicy,
        inputs: PolicyInputs<'_>,
    ) -> Result<AuthorizationPolicy, CascadeError> {
        let missing = |relation| CascadeError::MissingRelation {
            node: node.id,
            relation,
        };

        let view = inputs
            .policy_view
            .ok_or_else(|| missing(Relation::CommunityPolicy))?;
        let license = inputs.license.ok_or_else(|| missing(Relation::License))?;
        let account_policy = inputs
            .account_policy
            .ok_or_else(|| missing(Relation::AccountAuthorization))?;

        let is_subspace = matches!(node.kind, NodeKind::Subspace(_));

        // Private subspaces do not trust the grants of their parent and start over from the
        // account.
        let source = if !is_subspace || view.is_private() {
            account_policy
        } else {
            inputs
                .parent_policy
                .ok_or_else(|| missing(Relation::ParentAuthorization))?
        };

        let mut policy = current.reset();
        policy.inherit_from(source);

        if view.is_private() {
            policy.anonymous_read_access = false;
        }

        match license.visibility {
            Visibility::Active | Visibility::Demo | Visibility::Inactive => {
                self.append_local_rules(&mut policy, node, view, is_subspace, inputs.ancestors);
            }
            Visibility::Archived => {
                policy.anonymous_read_access = false;
            }
        }

        policy.append_privilege_rule(PrivilegeRule::new(
            SPACE_READ_IMPLIES,
            Privilege::Read,
            [Privilege::ReadAbout, Privilege::ReadLicense],
        ));
        policy.append_privilege_rule(PrivilegeRule::new(
            SPACE_CREATE_IMPLIES,
            Privilege::Create,
            [Privilege::CreateSubspace],
        ));

        Ok(policy)
    }

    fn append_local_rules(
        &self,
        policy: &mut AuthorizationPolicy,
        node: &ResourceNode,
        view: &CommunityPolicyView,
        is_subspace: bool,
        ancestors: &[NodeId],
    ) {
        let member = Credential::scoped(CredentialType::SpaceMember, node.id);

        append_rule(
            policy,
            SPACE_MEMBERS_READ,
            &[Privilege::Read],
            vec![member],
            true,
        );

        append_rule(
            policy,
            SPACE_ADMINS,
            &ADMIN_PRIVILEGES,
            vec![Credential::scoped(CredentialType::SpaceAdmin, node.id)],
            true,
        );

        let mut platform_admins = self.global_credentials(&[GlobalRole::Admin]);
        if view.allow_platform_support_as_admin {
            platform_admins.extend(self.global_credentials(&[GlobalRole::Support]));
        }
        append_rule(
            policy,
            SPACE_PLATFORM_SETTINGS,
            &[Privilege::AuthorizationReset, Privilege::PlatformAdmin],
            platform_admins,
            false,
        );

        append_rule(
            policy,
            SPACE_MEMBERS_NOTIFICATIONS,
            &[Privilege::ReceiveNotifications],
            vec![member],
            false,
        );

        if view.allow_members_to_create_subspaces {
            let mut creators = vec![member];
            if is_subspace && view.inherit_membership_rights && !view.is_private() {
                if let Some(parent_id) = node.parent_id {
                    creators.push(Credential::scoped(CredentialType::SpaceMember, parent_id));
                }
            }

            append_rule(
                policy,
                SPACE_MEMBERS_CREATE_SUBSPACE,
                &[Privilege::CreateSubspace],
                creators,
                false,
            );
        }

        if is_subspace && view.is_private() {
            let ancestor_admins = ancestors
                .iter()
                .map(|ancestor| Credential::scoped(CredentialType::SpaceAdmin, *ancestor))
                .collect();

            append_rule(
                policy,
                SPACE_PRIVATE_SUBSPACE_ADMINS,
                &ADMIN_PRIVILEGES,
                ancestor_admins,
                false,
            );
        }
    }

    fn global_credentials(&self, roles: &[GlobalRole]) -> Vec<Credential> {
        roles
            .iter()
            .filter(|role| self.config.has_global_role(**role))
            .map(|role| {
                let credential_type = match role {
                    GlobalRole::Admin => CredentialType::GlobalAdmin,
                    GlobalRole::Support => CredentialType::GlobalSupport,
                    GlobalRole::LicenseManager => CredentialType::GlobalLicenseManager,
                    GlobalRole::SpacesReader => CredentialType::GlobalSpacesReader,
                    GlobalRole::CommunityReader => CredentialType::GlobalCommunityRead,
                };
                Credential::global(credential_type)
            })
            .collect()
    }
}

/// Appends a credential rule, rules nobody could ever satisfy are left out.
fn append_rule(
    policy: &mut AuthorizationPolicy,
    tag: &str,
    privileges: &[Privilege],
    criteria: Vec<Credential>,
    cascade: bool,
) {
    if criteria.is_empty() {
        return;
    }

    policy.append_credential_rule(CredentialRule::new(
        tag,
        privileges.iter().copied(),
        criteria,
        cascade,
    ));
}

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("{relation} of node {node} is required to compute its authorization")]
    MissingRelation { node: NodeId, relation: Relation },
}
