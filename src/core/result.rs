//! # Results
//!
//! Progress and terminal values the pipeline emits, one family per action family.
//!
//! ```text
//! ClearErrorState   → ClearErrorState::Success
//! GetPsiCash*       → GetPsiCash::InFlight, then Success | Failure
//! RemovePurchases   → GetPsiCash::InFlight, then Success | Failure
//! MakeExpiring...   → ExpiringPurchase::InFlight, then
//!                     ExpiringPurchase::Success | ExpiringPurchase::Failure | GetPsiCash::Success
//! LoadVideoAd       → Video::Loading, (Loaded | Playing | RewardSuccess)*, then Finished | Failure
//! ```

use std::fmt;

use crate::client::ClientError;
use crate::core::model::{Balance, ExpiringPurchase};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PsiCashResult {
    ClearErrorState(ClearErrorStateResult),
    GetPsiCash(GetPsiCashResult),
    ExpiringPurchase(ExpiringPurchaseResult),
    Video(VideoResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearErrorStateResult {
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetPsiCashResult {
    InFlight,
    Success(Balance),
    Failure(ClientError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiringPurchaseResult {
    InFlight,
    Success(ExpiringPurchase),
    Failure(ClientError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoResult {
    Loading,
    Loaded,
    Playing,
    RewardSuccess(u64),
    /// Only ever emitted when the load ran to completion without error.
    Finished,
    Failure(ClientError),
}

impl PsiCashResult {
    /// True for values that close an action's sequence.
    pub fn is_terminal(&self) -> bool {
        match self {
            PsiCashResult::ClearErrorState(ClearErrorStateResult::Success) => true,
            PsiCashResult::GetPsiCash(r) => !matches!(r, GetPsiCashResult::InFlight),
            PsiCashResult::ExpiringPurchase(r) => !matches!(r, ExpiringPurchaseResult::InFlight),
            PsiCashResult::Video(r) => {
                matches!(r, VideoResult::Finished | VideoResult::Failure(_))
            }
        }
    }

    /// The collaborator error carried by a `Failure`, if any.
    pub fn failure(&self) -> Option<&ClientError> {
        match self {
            PsiCashResult::GetPsiCash(GetPsiCashResult::Failure(e))
            | PsiCashResult::ExpiringPurchase(ExpiringPurchaseResult::Failure(e))
            | PsiCashResult::Video(VideoResult::Failure(e)) => Some(e),
            _ => None,
        }
    }
}

impl From<GetPsiCashResult> for PsiCashResult {
    fn from(r: GetPsiCashResult) -> Self {
        PsiCashResult::GetPsiCash(r)
    }
}

impl From<ExpiringPurchaseResult> for PsiCashResult {
    fn from(r: ExpiringPurchaseResult) -> Self {
        PsiCashResult::ExpiringPurchase(r)
    }
}

impl From<VideoResult> for PsiCashResult {
    fn from(r: VideoResult) -> Self {
        PsiCashResult::Video(r)
    }
}

impl fmt::Display for PsiCashResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PsiCashResult::ClearErrorState(ClearErrorStateResult::Success) => {
                write!(f, "ClearErrorState::Success")
            }
            PsiCashResult::GetPsiCash(GetPsiCashResult::InFlight) => {
                write!(f, "GetPsiCash::InFlight")
            }
            PsiCashResult::GetPsiCash(GetPsiCashResult::Success(balance)) => write!(
                f,
                "GetPsiCash::Success (balance {}, {} purchases)",
                balance.balance,
                balance.purchases.len()
            ),
            PsiCashResult::GetPsiCash(GetPsiCashResult::Failure(e)) => {
                write!(f, "GetPsiCash::Failure ({e})")
            }
            PsiCashResult::ExpiringPurchase(ExpiringPurchaseResult::InFlight) => {
                write!(f, "ExpiringPurchase::InFlight")
            }
            PsiCashResult::ExpiringPurchase(ExpiringPurchaseResult::Success(p)) => write!(
                f,
                "ExpiringPurchase::Success ({}/{} {})",
                p.purchase.transaction_class, p.purchase.distinguisher, p.purchase.id
            ),
            PsiCashResult::ExpiringPurchase(ExpiringPurchaseResult::Failure(e)) => {
                write!(f, "ExpiringPurchase::Failure ({e})")
            }
            PsiCashResult::Video(VideoResult::Loading) => write!(f, "Video::Loading"),
            PsiCashResult::Video(VideoResult::Loaded) => write!(f, "Video::Loaded"),
            PsiCashResult::Video(VideoResult::Playing) => write!(f, "Video::Playing"),
            PsiCashResult::Video(VideoResult::RewardSuccess(amount)) => {
                write!(f, "Video::RewardSuccess ({amount})")
            }
            PsiCashResult::Video(VideoResult::Finished) => write!(f, "Video::Finished"),
            PsiCashResult::Video(VideoResult::Failure(e)) => write!(f, "Video::Failure ({e})"),
        }
    }
}

/// Contract violations. Unlike `ClientError`, these end the result stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// An action tag no lane handles.
    UnknownAction(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::UnknownAction(tag) => write!(f, "Unknown action: {tag}"),
        }
    }
}

impl std::error::Error for PipelineError {}
