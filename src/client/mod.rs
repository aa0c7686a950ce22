pub mod provider;
pub mod simulated;

pub use provider::{AdClient, ClientError, RewardClient, VideoRequest};
pub use simulated::{SimulatedAdClient, SimulatedRewardClient};
