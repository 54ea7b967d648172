// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeSet;

use arbor_core::BaselineLicensePlan;
use serde::{Deserialize, Serialize};

/// Platform-wide roles whose optional account rules can be switched on or off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GlobalRole {
    Admin,
    Support,
    LicenseManager,
    SpacesReader,
    CommunityReader,
}

impl GlobalRole {
    pub const ALL: [GlobalRole; 5] = [
        GlobalRole::Admin,
        GlobalRole::Support,
        GlobalRole::LicenseManager,
        GlobalRole::SpacesReader,
        GlobalRole::CommunityReader,
    ];
}

/// Configuration for the propagation engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Deepest traversal below the node a propagation starts from. Deeper branches are skipped.
    pub(crate) max_depth: usize,

    /// Deepest nesting level a subspace may be created at.
    pub(crate) max_space_level: u8,

    /// Plan attached to every newly created account.
    pub(crate) default_baseline_plan: BaselineLicensePlan,

    /// Enabled platform roles, optional account rules are only added for these.
    pub(crate) global_roles: BTreeSet<GlobalRole>,

    /// When false, external subscriptions are never consulted.
    pub(crate) subscriptions_enabled: bool,
}

impl Config {
    pub fn new() -> Self {
        Self {
            max_depth: 10,
            max_space_level: 2,
            default_baseline_plan: BaselineLicensePlan::default(),
            global_roles: GlobalRole::ALL.into_iter().collect(),
            subscriptions_enabled: true,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_space_level(mut self, max_space_level: u8) -> Self {
        self.max_space_level = max_space_level;
        self
    }

    pub fn with_default_baseline_plan(mut self, plan: BaselineLicensePlan) -> Self {
        self.default_baseline_plan = plan;
        self
    }

    pub fn with_global_roles(mut self, roles: impl IntoIterator<Item = GlobalRole>) -> Self {
        self.global_roles = roles.into_iter().collect();
        self
    }

    pub fn with_subscriptions(mut self, enabled: bool) -> Self {
        self.subscriptions_enabled = enabled;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn max_space_level(&self) -> u8 {
        self.max_space_level
    }

    pub fn default_baseline_plan(&self) -> &BaselineLicensePlan {
        &self.default_baseline_plan
    }

    pub fn has_global_role(&self, role: GlobalRole) -> bool {
        self.global_roles.contains(&role)
    }

    pub fn subscriptions_enabled(&self) -> bool {
        self.subscriptions_enabled
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
