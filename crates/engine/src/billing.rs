//! External billing provider, narrowed to what organization removal needs.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("billing gateway error: {0}")]
pub struct BillingError(pub String);

pub trait BillingGateway: Send + Sync {
    /// Identifiers of the customer's not-yet-canceled subscriptions.
    fn active_subscriptions(&self, customer_id: &str) -> Result<Vec<String>, BillingError>;

    fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError>;
}

#[derive(Debug, Clone)]
struct Subscription {
    id: String,
    canceled: bool,
}

/// In-memory gateway for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryBillingGateway {
    subscriptions: Mutex<HashMap<String, Vec<Subscription>>>,
}

impl InMemoryBillingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subscription(&self, customer_id: &str, subscription_id: &str) {
        self.add(customer_id, subscription_id, false);
    }

    pub fn add_canceled_subscription(&self, customer_id: &str, subscription_id: &str) {
        self.add(customer_id, subscription_id, true);
    }

    fn add(&self, customer_id: &str, subscription_id: &str, canceled: bool) {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        subscriptions
            .entry(customer_id.to_string())
            .or_default()
            .push(Subscription {
                id: subscription_id.to_string(),
                canceled,
            });
    }

    pub fn is_canceled(&self, subscription_id: &str) -> bool {
        let subscriptions = self.subscriptions.lock().unwrap();
        subscriptions
            .values()
            .flatten()
            .any(|s| s.id == subscription_id && s.canceled)
    }
}

impl BillingGateway for InMemoryBillingGateway {
    fn active_subscriptions(&self, customer_id: &str) -> Result<Vec<String>, BillingError> {
        let subscriptions = self.subscriptions.lock().unwrap();
        Ok(subscriptions
            .get(customer_id)
            .map(|subs| {
                subs.iter()
                    .filter(|s| !s.canceled)
                    .map(|s| s.id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        for subs in subscriptions.values_mut() {
            if let Some(sub) = subs.iter_mut().find(|s| s.id == subscription_id) {
                sub.canceled = true;
                return Ok(());
            }
        }
        Err(BillingError(format!(
            "unknown subscription: {subscription_id}"
        )))
    }
}
