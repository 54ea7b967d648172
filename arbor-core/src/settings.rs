// SPDX-License-Identifier: MIT OR Apache-2.0

//! Space settings and the community policy view derived from them.
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrivacyMode {
    #[default]
    Public,
    Private,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MembershipPolicy {
    Open,
    #[default]
    Applications,
    Invitations,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacySettings {
    pub mode: PrivacyMode,
    pub allow_platform_support_as_admin: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSettings {
    pub policy: MembershipPolicy,
    pub allow_subspace_admins_to_invite_members: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaborationSettings {
    pub allow_members_to_create_subspaces: bool,
    pub allow_members_to_create_callouts: bool,
    pub inherit_membership_rights: bool,
    pub allow_events_from_subspaces: bool,
}

/// Settings of a root space or subspace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceSettings {
    pub privacy: PrivacySettings,
    pub membership: MembershipSettings,
    pub collaboration: CollaborationSettings,
}

impl SpaceSettings {
    /// Default settings for a space created at the given level.
    pub fn for_level(level: u8) -> Self {
        let mut settings = Self {
            privacy: PrivacySettings::default(),
            membership: MembershipSettings::default(),
            collaboration: CollaborationSettings {
                allow_members_to_create_subspaces: false,
                allow_members_to_create_callouts: true,
                inherit_membership_rights: true,
                allow_events_from_subspaces: true,
            },
        };

        if level > 0 {
            settings.membership.allow_subspace_admins_to_invite_members = true;
        }

        settings
    }

    /// Returns true if switching to `updated` can change any authorization overlay.
    ///
    /// Only `collaboration.allow_events_from_subspaces` is known not to influence authorization,
    /// every other difference requires a new propagation pass.
    pub fn requires_policy_update(&self, updated: &SpaceSettings) -> bool {
        let mut current = self.clone();
        current.collaboration.allow_events_from_subspaces =
            updated.collaboration.allow_events_from_subspaces;
        current != *updated
    }
}

/// Read-only snapshot of the community settings which influence authorization of one node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityPolicyView {
    pub privacy_mode: PrivacyMode,
    pub allow_platform_support_as_admin: bool,
    pub membership_policy: MembershipPolicy,
    pub allow_members_to_create_subspaces: bool,
    pub inherit_membership_rights: bool,
    pub allow_subspace_admins_to_invite_members: bool,
}

impl CommunityPolicyView {
    pub fn is_private(&self) -> bool {
        self.privacy_mode == PrivacyMode::Private
    }
}

impl From<&SpaceSettings> for CommunityPolicyView {
    fn from(settings: &SpaceSettings) -> Self {
        Self {
            privacy_mode: settings.privacy.mode,
            allow_platform_support_as_admin: settings.privacy.allow_platform_support_as_admin,
            membership_policy: settings.membership.policy,
            allow_members_to_create_subspaces: settings
                .collaboration
                .allow_members_to_create_subspaces,
            inherit_membership_rights: settings.collaboration.inherit_membership_rights,
            allow_subspace_admins_to_invite_members: settings
                .membership
                .allow_subspace_admins_to_invite_members,
        }
    }
}
