//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{Sender, UnboundedReceiver};

use crate::client::{AdClient, ClientError, RewardClient, VideoRequest};
use crate::core::model::{
    Balance, ConnectionState, ExpiringPurchase, Purchase, PurchaseOutcome, PurchasePrice,
    VideoEvent,
};
use crate::core::notifier::{ChannelNotifier, Notification};
use crate::pipeline::ActionProcessor;

pub fn boost_price(price: i64) -> PurchasePrice {
    PurchasePrice {
        transaction_class: "speed-boost".to_string(),
        distinguisher: "1hr".to_string(),
        price,
    }
}

pub fn expiring_purchase(id: &str) -> ExpiringPurchase {
    ExpiringPurchase {
        purchase: Purchase {
            id: id.to_string(),
            transaction_class: "speed-boost".to_string(),
            distinguisher: "1hr".to_string(),
            expiry: None,
            authorization: None,
        },
    }
}

/// A reward client with canned answers. Clones share their counters.
#[derive(Clone)]
pub struct StubRewardClient {
    balance: Result<Balance, ClientError>,
    purchase: Result<PurchaseOutcome, ClientError>,
    gate: Option<Arc<Semaphore>>,
    pub remote_calls: Arc<AtomicUsize>,
    pub removed_ids: Arc<Mutex<Vec<String>>>,
}

impl StubRewardClient {
    pub fn new() -> Self {
        Self {
            balance: Ok(Balance {
                balance: 100,
                purchases: vec![],
            }),
            purchase: Ok(PurchaseOutcome::Expiring(expiring_purchase("p-1"))),
            gate: None,
            remote_calls: Arc::new(AtomicUsize::new(0)),
            removed_ids: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_balance(mut self, balance: Result<Balance, ClientError>) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_purchase(mut self, purchase: Result<PurchaseOutcome, ClientError>) -> Self {
        self.purchase = purchase;
        self
    }

    /// Remote fetches park until `release` hands out a permit.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }
}

#[async_trait]
impl RewardClient for StubRewardClient {
    async fn fetch_remote(&self, _connection_state: ConnectionState) -> Result<Balance, ClientError> {
        self.remote_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate
            && let Ok(permit) = gate.acquire().await
        {
            permit.forget();
        }
        self.balance.clone()
    }

    async fn fetch_local(&self) -> Result<Balance, ClientError> {
        self.balance.clone()
    }

    async fn purchase(
        &self,
        _connection_state: ConnectionState,
        _price: &PurchasePrice,
        _has_active_boost: bool,
    ) -> Result<PurchaseOutcome, ClientError> {
        self.purchase.clone()
    }

    async fn remove_purchases(&self, purchase_ids: &[String]) -> Result<Balance, ClientError> {
        self.removed_ids
            .lock()
            .unwrap()
            .extend(purchase_ids.iter().cloned());
        self.balance.clone()
    }

    fn rewarded_video_custom_data(&self) -> String {
        "stub-custom-data".to_string()
    }
}

/// One step of a scripted video load.
pub enum AdStep {
    Emit(VideoEvent),
    Fail(ClientError),
    /// Never finishes; only cancellation ends the load.
    Hang,
}

/// An ad client that plays one script per `load_video` call, in order.
/// A call with no script left completes immediately with no events.
#[derive(Clone)]
pub struct StubAdClient {
    scripts: Arc<Mutex<VecDeque<Vec<AdStep>>>>,
    pub requests: Arc<Mutex<Vec<VideoRequest>>>,
    pub started: Arc<AtomicUsize>,
    /// Loads dropped before they returned.
    pub cancelled: Arc<AtomicUsize>,
}

impl StubAdClient {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            started: Arc::new(AtomicUsize::new(0)),
            cancelled: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_script(self, steps: Vec<AdStep>) -> Self {
        self.scripts.lock().unwrap().push_back(steps);
        self
    }
}

struct CancelGuard {
    cancelled: Arc<AtomicUsize>,
    armed: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl AdClient for StubAdClient {
    fn name(&self) -> &str {
        "stub"
    }

    async fn load_video(
        &self,
        request: VideoRequest,
        sender: Sender<VideoEvent>,
    ) -> Result<(), ClientError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let steps = self.scripts.lock().unwrap().pop_front().unwrap_or_default();

        let mut guard = CancelGuard {
            cancelled: self.cancelled.clone(),
            armed: true,
        };
        for step in steps {
            match step {
                AdStep::Emit(event) => {
                    if sender.send(event).await.is_err() {
                        return Err(ClientError::Worker("receiver dropped".to_string()));
                    }
                }
                AdStep::Fail(err) => {
                    guard.armed = false;
                    return Err(err);
                }
                AdStep::Hang => std::future::pending::<()>().await,
            }
        }
        guard.armed = false;
        Ok(())
    }
}

/// A processor over the given doubles, plus the queue its notifications land on.
pub fn test_processor(
    reward: StubRewardClient,
    ads: StubAdClient,
) -> (ActionProcessor, UnboundedReceiver<Notification>) {
    let (notifier, notifications) = ChannelNotifier::new();
    let processor = ActionProcessor::new(Arc::new(reward), Arc::new(ads), Arc::new(notifier));
    (processor, notifications)
}

/// Yields to the runtime until `condition` holds, giving up after a while.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}
