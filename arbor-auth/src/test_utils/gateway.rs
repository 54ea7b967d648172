// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use arbor_core::GrantedEntitlement;
use arbor_core::traits::SubscriptionGateway;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct GatewayState {
    subscriptions: HashMap<String, Vec<GrantedEntitlement>>,
    requests: usize,
}

/// Subscription provider answering from a map, counting requests.
#[derive(Clone, Debug)]
pub struct MemorySubscriptionGateway {
    enabled: bool,
    state: Arc<RwLock<GatewayState>>,
}

impl MemorySubscriptionGateway {
    pub fn new() -> Self {
        Self {
            enabled: true,
            state: Arc::default(),
        }
    }

    /// Gateway reporting itself as switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            state: Arc::default(),
        }
    }

    pub async fn set_entitlements(&self, subscription_id: &str, granted: Vec<GrantedEntitlement>) {
        let mut state = self.state.write().await;
        state
            .subscriptions
            .insert(subscription_id.to_string(), granted);
    }

    /// Number of entitlement requests answered so far.
    pub async fn requests(&self) -> usize {
        self.state.read().await.requests
    }
}

impl Default for MemorySubscriptionGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionGateway for MemorySubscriptionGateway {
    type Error = SubscriptionError;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn entitlements(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<GrantedEntitlement>, Self::Error> {
        let mut state = self.state.write().await;
        state.requests += 1;
        state
            .subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| SubscriptionError::UnknownSubscription(subscription_id.to_string()))
    }
}

/// Subscription provider which is enabled but never reachable.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingSubscriptionGateway;

impl SubscriptionGateway for FailingSubscriptionGateway {
    type Error = SubscriptionError;

    fn is_enabled(&self) -> bool {
        true
    }

    async fn entitlements(
        &self,
        _subscription_id: &str,
    ) -> Result<Vec<GrantedEntitlement>, Self::Error> {
        Err(SubscriptionError::Unavailable)
    }
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("unknown subscription {0}")]
    UnknownSubscription(String),

    #[error("subscription provider unavailable")]
    Unavailable,
}
