// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authorization and licensing propagation over a tree of accounts, spaces and subspaces.
//!
//! Whenever policy-relevant state of a node changes, its [`AuthorizationPolicy`] and [`License`]
//! overlays are recomputed together with the overlays of all descendants. Authorization flows
//! from the top of the tree downwards: an account grants to its root spaces, a space grants to
//! its subspaces, unless privacy settings cut the inheritance chain. Licenses are resolved from
//! a baseline plan, licensing credentials and an optional external subscription.
//!
//! ## Design
//!
//! [`TreePropagationDriver`] walks the tree depth-first. For every node it first resolves the
//! license with [`EntitlementResolver`] and then computes the authorization policy with
//! [`AuthorizationCascadeEngine`], the visibility of the freshly resolved license decides which
//! local rules a space receives. A node's policy is always computed before its children's
//! policies, which take it as explicit input. Cycles and overly deep branches are skipped with a
//! warning instead of aborting the whole run.
//!
//! [`Manager`] offers the operations changing the tree, each of them ends with a propagation run
//! whose results are persisted in one atomic batch.
//!
//! Storage, credential lookup, subscription data and community settings are reached through the
//! traits in `arbor_core::traits`, the `arbor-store` crate provides in-memory and SQLite
//! implementations.
//!
//! [`AuthorizationPolicy`]: arbor_core::AuthorizationPolicy
//! [`License`]: arbor_core::License
pub mod cascade;
pub mod config;
pub mod driver;
pub mod entitlements;
pub mod gateway;
pub mod manager;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use cascade::{AuthorizationCascadeEngine, CascadeError, PolicyInputs};
pub use config::{Config, GlobalRole};
pub use driver::{DriverError, PropagationError, PropagationResult, TreePropagationDriver};
pub use entitlements::{EntitlementResolver, LicensingError};
pub use gateway::NoSubscriptions;
pub use manager::{Manager, ManagerError, OperationError};
