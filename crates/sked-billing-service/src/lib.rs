//! Sked-Billing Service - billing engine and scheduled runner.
//!
//! [`BillingEngine`] drives subscriptions, billing cycles and tenant cycles
//! through their lifecycles against a [`sked_billing_store::Store`].
//! [`runner::run_periodically`] settles due subscriptions on a fixed
//! interval.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod engine;
pub mod error;
pub mod runner;

pub use config::EngineConfig;
pub use engine::{BillingEngine, BillingRunFailure, BillingRunSummary};
pub use error::{EngineError, Result};
