//! # Simulated Collaborators
//!
//! In-memory stand-ins for the reward server and the ad SDK, used by the
//! `psicash` binary and the integration tests.
//!
//! ```text
//! SimulatedRewardClient                    SimulatedAdClient
//! ┌──────────────────────────┐  credit()   ┌──────────────────┐
//! │ server wallet  (truth)   │◀────────────│ Loaded           │
//! │ cached wallet  (local)   │             │ Playing          │
//! └──────────────────────────┘             │ Reward(amount)   │
//!                                          └──────────────────┘
//! ```
//!
//! The cached wallet only catches up with the server on a remote fetch or
//! after a call that changes the wallet, so `GetPsiCashLocal` can lag behind
//! a video reward exactly like the real client does.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

use crate::client::provider::{AdClient, ClientError, RewardClient, VideoRequest};
use crate::core::model::{
    Balance, ConnectionState, ExpiringPurchase, Purchase, PurchaseOutcome, PurchasePrice,
    VideoEvent,
};

pub const DEFAULT_PURCHASE_DURATION_SECS: i64 = 3600;

#[derive(Debug, Default)]
struct Wallets {
    server: Balance,
    cached: Balance,
}

pub struct SimulatedRewardClient {
    wallets: Mutex<Wallets>,
    latency: Duration,
    purchase_duration: chrono::Duration,
}

impl SimulatedRewardClient {
    pub fn new(starting_balance: i64) -> Self {
        let wallet = Balance {
            balance: starting_balance,
            purchases: vec![],
        };
        Self {
            wallets: Mutex::new(Wallets {
                server: wallet.clone(),
                cached: wallet,
            }),
            latency: Duration::ZERO,
            purchase_duration: chrono::Duration::seconds(DEFAULT_PURCHASE_DURATION_SECS),
        }
    }

    /// Delay applied to every call before it touches the wallet.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_purchase_duration(mut self, purchase_duration: chrono::Duration) -> Self {
        self.purchase_duration = purchase_duration;
        self
    }

    /// Adds `amount` to the server wallet. The cached wallet is untouched.
    pub fn credit(&self, amount: u64) {
        let mut wallets = self.lock();
        wallets.server.balance = wallets.server.balance.saturating_add_unsigned(amount);
        info!(
            "Credited {amount}; server balance now {}",
            wallets.server.balance
        );
    }

    /// The server-side wallet, bypassing the cache.
    pub fn server_balance(&self) -> Balance {
        self.lock().server.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Wallets> {
        self.wallets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn require_tunnel(connection_state: ConnectionState) -> Result<(), ClientError> {
        if connection_state.is_connected() {
            Ok(())
        } else {
            Err(ClientError::Network(format!(
                "tunnel is {}",
                connection_state.label()
            )))
        }
    }

    /// Drops purchases whose expiry has passed.
    fn prune_expired(wallet: &mut Balance) {
        let now = Utc::now();
        wallet
            .purchases
            .retain(|p| p.expiry.is_none_or(|expiry| expiry > now));
    }
}

#[async_trait]
impl RewardClient for SimulatedRewardClient {
    async fn fetch_remote(&self, connection_state: ConnectionState) -> Result<Balance, ClientError> {
        self.simulate_latency().await;
        Self::require_tunnel(connection_state)?;

        let mut wallets = self.lock();
        Self::prune_expired(&mut wallets.server);
        wallets.cached = wallets.server.clone();
        debug!("Remote refresh: balance {}", wallets.cached.balance);
        Ok(wallets.cached.clone())
    }

    async fn fetch_local(&self) -> Result<Balance, ClientError> {
        self.simulate_latency().await;
        let mut wallets = self.lock();
        Self::prune_expired(&mut wallets.cached);
        Ok(wallets.cached.clone())
    }

    async fn purchase(
        &self,
        connection_state: ConnectionState,
        price: &PurchasePrice,
        has_active_boost: bool,
    ) -> Result<PurchaseOutcome, ClientError> {
        self.simulate_latency().await;
        Self::require_tunnel(connection_state)?;

        let mut wallets = self.lock();
        Self::prune_expired(&mut wallets.server);

        if has_active_boost {
            // Nothing to buy: the boost is still running, so hand back the wallet.
            debug!(
                "Purchase of {}/{} skipped: boost already active",
                price.transaction_class, price.distinguisher
            );
            wallets.cached = wallets.server.clone();
            return Ok(PurchaseOutcome::Balance(wallets.cached.clone()));
        }

        if price.price < 0 {
            return Err(ClientError::Server {
                status: 400,
                message: format!("invalid price {}", price.price),
            });
        }
        let remaining = match wallets.server.balance.checked_sub(price.price) {
            Some(remaining) if remaining >= 0 => remaining,
            _ => {
                return Err(ClientError::InsufficientBalance {
                    balance: wallets.server.balance,
                    price: price.price,
                });
            }
        };
        let expiry = Utc::now()
            .checked_add_signed(self.purchase_duration)
            .ok_or_else(|| ClientError::Server {
                status: 500,
                message: "purchase expiry out of range".to_string(),
            })?;

        let purchase = Purchase {
            id: Uuid::new_v4().to_string(),
            transaction_class: price.transaction_class.clone(),
            distinguisher: price.distinguisher.clone(),
            expiry: Some(expiry),
            authorization: Some(Uuid::new_v4().simple().to_string()),
        };
        wallets.server.balance = remaining;
        wallets.server.purchases.push(purchase.clone());
        wallets.cached = wallets.server.clone();
        info!(
            "Purchased {}/{} for {} ({})",
            purchase.transaction_class, purchase.distinguisher, price.price, purchase.id
        );

        Ok(PurchaseOutcome::Expiring(ExpiringPurchase { purchase }))
    }

    async fn remove_purchases(&self, purchase_ids: &[String]) -> Result<Balance, ClientError> {
        self.simulate_latency().await;
        let mut wallets = self.lock();
        let Wallets { server, cached } = &mut *wallets;
        for wallet in [server, cached] {
            wallet.purchases.retain(|p| !purchase_ids.contains(&p.id));
        }
        debug!("Removed purchases {:?}", purchase_ids);
        Ok(wallets.cached.clone())
    }

    fn rewarded_video_custom_data(&self) -> String {
        serde_json::json!({
            "client": "simulated",
            "nonce": Uuid::new_v4().to_string(),
        })
        .to_string()
    }
}

/// Plays a fixed rewarded video: Loaded, Playing, then a reward credited to
/// the shared ledger.
pub struct SimulatedAdClient {
    ledger: Arc<SimulatedRewardClient>,
    reward: u64,
    latency: Duration,
}

impl SimulatedAdClient {
    pub fn new(ledger: Arc<SimulatedRewardClient>, reward: u64) -> Self {
        Self {
            ledger,
            reward,
            latency: Duration::ZERO,
        }
    }

    /// Delay between consecutive video events.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn emit(&self, sender: &Sender<VideoEvent>, event: VideoEvent) -> Result<(), ClientError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        sender
            .send(event)
            .await
            .map_err(|_| ClientError::VideoUnavailable("player closed".to_string()))
    }
}

#[async_trait]
impl AdClient for SimulatedAdClient {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn load_video(
        &self,
        request: VideoRequest,
        sender: Sender<VideoEvent>,
    ) -> Result<(), ClientError> {
        if !request.connection_state.is_connected() {
            return Err(ClientError::VideoUnavailable(format!(
                "no ads while the tunnel is {}",
                request.connection_state.label()
            )));
        }
        if request.custom_data.is_empty() {
            return Err(ClientError::VideoUnavailable(
                "missing reward custom data".to_string(),
            ));
        }

        self.emit(&sender, VideoEvent::Loaded).await?;
        self.emit(&sender, VideoEvent::Playing).await?;
        self.ledger.credit(self.reward);
        self.emit(&sender, VideoEvent::Reward(self.reward)).await
    }
}
