//! # Actions
//!
//! Everything the wallet UI can ask of the pipeline becomes an `Action`.
//! User taps "Buy speed boost"? That's `Action::MakeExpiringPurchase`.
//! Tunnel came up? That's `Action::GetPsiCashRemote`.
//!
//! Actions arrive from outside the process boundary as tagged values, so the
//! pipeline accepts `IncomingAction`: either a known `Action` or the tag of
//! something it has never heard of.
//!
//! ```text
//! IncomingAction ─┬─ Known(Action)        →  one lane
//!                 └─ Unrecognized(tag)    →  catch-all (fatal)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::model::{ConnectionState, PurchasePrice};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Action {
    ClearErrorState,
    GetPsiCashRemote {
        connection_state: ConnectionState,
    },
    GetPsiCashLocal,
    MakeExpiringPurchase {
        connection_state: ConnectionState,
        price: PurchasePrice,
        #[serde(default)]
        has_active_boost: bool,
    },
    RemovePurchases {
        purchases: Vec<String>,
    },
    LoadVideoAd {
        connection_state: ConnectionState,
    },
}

impl Action {
    /// Every tag the pipeline knows how to route.
    pub const TAGS: [&'static str; 6] = [
        "ClearErrorState",
        "GetPsiCashRemote",
        "GetPsiCashLocal",
        "MakeExpiringPurchase",
        "RemovePurchases",
        "LoadVideoAd",
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Action::ClearErrorState => "ClearErrorState",
            Action::GetPsiCashRemote { .. } => "GetPsiCashRemote",
            Action::GetPsiCashLocal => "GetPsiCashLocal",
            Action::MakeExpiringPurchase { .. } => "MakeExpiringPurchase",
            Action::RemovePurchases { .. } => "RemovePurchases",
            Action::LoadVideoAd { .. } => "LoadVideoAd",
        }
    }

    pub fn is_known_tag(tag: &str) -> bool {
        Self::TAGS.contains(&tag)
    }
}

/// An action as received at the pipeline boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingAction {
    Known(Action),
    /// Tag the pipeline has no lane for.
    Unrecognized(String),
}

impl IncomingAction {
    /// Classifies a JSON action by its `type` tag.
    ///
    /// Unknown tags are not an error here; they are routed to the catch-all
    /// lane, which ends the result stream. A known tag with bad fields is an error.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let tag = match value.get("type").and_then(|t| t.as_str()) {
            Some(tag) => tag.to_string(),
            None => return Ok(IncomingAction::Unrecognized(value.to_string())),
        };

        if !Action::is_known_tag(&tag) {
            return Ok(IncomingAction::Unrecognized(tag));
        }

        serde_json::from_value(value).map(IncomingAction::Known)
    }
}

impl From<Action> for IncomingAction {
    fn from(action: Action) -> Self {
        IncomingAction::Known(action)
    }
}

impl fmt::Display for IncomingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncomingAction::Known(action) => write!(f, "{}", action.tag()),
            IncomingAction::Unrecognized(tag) => write!(f, "{tag}"),
        }
    }
}
