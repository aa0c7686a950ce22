use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;

use crate::core::model::{Balance, ConnectionState, PurchaseOutcome, PurchasePrice, VideoEvent};

/// Errors a collaborator call can end with.
/// Lanes turn these into `Failure` results; they never end the result stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Transport-level failure (no tunnel, DNS, connection reset).
    Network(String),
    /// The reward server answered with an error status.
    Server { status: u16, message: String },
    /// The wallet cannot cover the requested price.
    InsufficientBalance { balance: i64, price: i64 },
    /// The ad SDK had no video to serve or aborted playback.
    VideoUnavailable(String),
    /// The background worker running the call died (panicked or was torn down).
    Worker(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Network(msg) => write!(f, "network error: {msg}"),
            ClientError::Server { status, message } => {
                write!(f, "server error (HTTP {status}): {message}")
            }
            ClientError::InsufficientBalance { balance, price } => {
                write!(f, "insufficient balance: {balance} < {price}")
            }
            ClientError::VideoUnavailable(msg) => write!(f, "video unavailable: {msg}"),
            ClientError::Worker(msg) => write!(f, "worker error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

/// Everything the ad SDK needs to load one rewarded video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRequest {
    pub connection_state: ConnectionState,
    /// Opaque blob from `RewardClient::rewarded_video_custom_data`, forwarded to
    /// the ad network so the reward can be credited server-side.
    pub custom_data: String,
}

/// The reward-currency server, as seen by the pipeline.
///
/// Shared by every lane and called concurrently, hence `Send + Sync`.
#[async_trait]
pub trait RewardClient: Send + Sync {
    /// Refreshes the wallet from the server.
    async fn fetch_remote(&self, connection_state: ConnectionState) -> Result<Balance, ClientError>;

    /// Reads the locally cached wallet.
    async fn fetch_local(&self) -> Result<Balance, ClientError>;

    /// Attempts an expiring purchase.
    async fn purchase(
        &self,
        connection_state: ConnectionState,
        price: &PurchasePrice,
        has_active_boost: bool,
    ) -> Result<PurchaseOutcome, ClientError>;

    /// Drops the given purchases (by id) from the wallet.
    async fn remove_purchases(&self, purchase_ids: &[String]) -> Result<Balance, ClientError>;

    /// Custom data to attach to a rewarded video request.
    fn rewarded_video_custom_data(&self) -> String;
}

#[async_trait]
pub trait AdClient: Send + Sync {
    /// Returns the name of the ad backend.
    fn name(&self) -> &str;

    /// Loads and plays one rewarded video, sending progress events to the provided channel.
    ///
    /// Returns once the video is done. The call is cancelled by dropping its future,
    /// so implementations must not hold state that outlives it.
    async fn load_video(
        &self,
        request: VideoRequest,
        sender: Sender<VideoEvent>,
    ) -> Result<(), ClientError>;
}
