//! # Notifications
//!
//! Out-of-band side effects of specific results: a new expiring purchase
//! (schedule its expiry alarm) and a new reward (tell the user).
//!
//! The pipeline calls a `Notifier` as results are delivered; the default
//! `ChannelNotifier` only enqueues, so the owner can drain notifications on
//! its own schedule and a slow consumer never holds up the result stream.

use log::{debug, warn};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::core::model::ExpiringPurchase;
use crate::core::result::{ExpiringPurchaseResult, PsiCashResult, VideoResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    NewExpiringPurchase(ExpiringPurchase),
    NewReward(u64),
}

/// Sink for result-driven side effects. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn on_new_expiring_purchase(&self, purchase: &ExpiringPurchase);
    fn on_new_reward(&self, amount: u64);
}

/// Queues notifications on an unbounded channel.
#[derive(Clone)]
pub struct ChannelNotifier {
    sender: UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, UnboundedReceiver<Notification>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }

    fn push(&self, notification: Notification) {
        debug!("Queueing notification: {:?}", notification);
        if self.sender.send(notification).is_err() {
            warn!("Notification dropped: receiver dropped");
        }
    }
}

impl Notifier for ChannelNotifier {
    fn on_new_expiring_purchase(&self, purchase: &ExpiringPurchase) {
        self.push(Notification::NewExpiringPurchase(purchase.clone()));
    }

    fn on_new_reward(&self, amount: u64) {
        self.push(Notification::NewReward(amount));
    }
}

/// Fires the notifier for the two result shapes that carry a side effect.
pub fn notify(notifier: &dyn Notifier, result: &PsiCashResult) {
    match result {
        PsiCashResult::ExpiringPurchase(ExpiringPurchaseResult::Success(purchase)) => {
            notifier.on_new_expiring_purchase(purchase);
        }
        PsiCashResult::Video(VideoResult::RewardSuccess(amount)) => {
            notifier.on_new_reward(*amount);
        }
        _ => {}
    }
}
