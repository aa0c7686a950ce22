//! # Wallet Model
//!
//! Payload types exchanged with the reward and ad collaborators.
//! Amounts are in nano-PsiCash, the same unit the reward server reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tunnel state at the time an action was issued.
/// Remote calls and video loads only succeed while `Connected`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

/// A purchasable item as advertised by the reward server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PurchasePrice {
    pub transaction_class: String,
    pub distinguisher: String,
    pub price: i64,
}

/// A purchase the wallet holds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    pub id: String,
    pub transaction_class: String,
    pub distinguisher: String,
    pub expiry: Option<DateTime<Utc>>,
    pub authorization: Option<String>,
}

/// A freshly made purchase that expires at a server-set time (e.g. a speed boost).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExpiringPurchase {
    pub purchase: Purchase,
}

impl ExpiringPurchase {
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.purchase.expiry
    }
}

/// Snapshot of the wallet: spendable balance plus the purchases currently held.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Balance {
    pub balance: i64,
    #[serde(default)]
    pub purchases: Vec<Purchase>,
}

/// What a purchase call can hand back.
///
/// The server answers with a refreshed `Balance` instead of a new purchase when
/// nothing was bought (for instance, a boost is already active).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Expiring(ExpiringPurchase),
    Balance(Balance),
}

/// Progress reported by the ad SDK while a rewarded video runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoEvent {
    Loaded,
    Playing,
    /// The user earned `amount` by watching the video.
    Reward(u64),
}
