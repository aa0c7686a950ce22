//! # Core Types
//!
//! The vocabulary the pipeline speaks. It knows nothing about how actions are
//! produced or where results go.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │          CORE           │
//!                    │     (this module)       │
//!                    │                         │
//!                    │  • Action (requests)    │
//!                    │  • PsiCashResult (out)  │
//!                    │  • model (wallet data)  │
//!                    │  • Notifier (effects)   │
//!                    └───────────┬─────────────┘
//!                                │
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!     ┌────────────┐      ┌────────────┐      ┌────────────┐
//!     │  pipeline  │      │   client   │      │   script   │
//!     │  (lanes)   │      │ (collabor- │      │  (JSONL    │
//!     │            │      │   ators)   │      │   input)   │
//!     └────────────┘      └────────────┘      └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`action`]: The `Action` enum, plus `IncomingAction` for unknown tags
//! - [`result`]: `PsiCashResult` and its families, and `PipelineError`
//! - [`model`]: Wallet payloads shared with the collaborators
//! - [`notifier`]: Side effects fired by specific results
//! - [`config`]: Settings and their override hierarchy

pub mod action;
pub mod config;
pub mod model;
pub mod notifier;
pub mod result;

pub use action::{Action, IncomingAction};
pub use result::{PipelineError, PsiCashResult};
