// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence for nodes, overlays and credentials.
//!
//! Both backends implement [`PolicyStore`](arbor_core::traits::PolicyStore),
//! [`CredentialIndex`](arbor_core::traits::CredentialIndex) and
//! [`CommunityPolicyResolver`](arbor_core::traits::CommunityPolicyResolver), so one value can be
//! handed to the propagation engine for all three roles.
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "memory")]
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteError, SqliteStore, SqliteStoreBuilder};
