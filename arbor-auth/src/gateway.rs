// SPDX-License-Identifier: MIT OR Apache-2.0

use std::convert::Infallible;

use arbor_core::GrantedEntitlement;
use arbor_core::traits::SubscriptionGateway;

/// Gateway for deployments without an external subscription provider.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSubscriptions;

impl SubscriptionGateway for NoSubscriptions {
    type Error = Infallible;

    fn is_enabled(&self) -> bool {
        false
    }

    async fn entitlements(
        &self,
        _subscription_id: &str,
    ) -> Result<Vec<GrantedEntitlement>, Self::Error> {
        Ok(Vec::new())
    }
}
