// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities.
mod gateway;
mod tree;

pub use gateway::{FailingSubscriptionGateway, MemorySubscriptionGateway, SubscriptionError};
pub use tree::{TestTree, account_node, root_space_node, subspace_node};

/// Installs a tracing subscriber if `RUST_LOG` is set.
pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}
