//! # Cost Tracker
//!
//! Per-session spend accounting for agent calls.
//!
//! Every billable call (a language-model call or an image generation) is
//! priced by a [`PricingTable`], appended to the ledger as an immutable
//! [`CostEntry`] and folded into the session's [`SessionCosts`] aggregate.
//! Callers consult [`CostTracker::check_limits`] before dispatching more
//! work; the tracker itself never blocks a call.
//!
//! Storage is abstract ([`KeyValueStore`]). Ledger keys are
//! `cost_entry:<session_id>:<timestamp_nanos>`; aggregates live at
//! `session_costs:<session_id>`.

pub mod error;
pub mod pricing;
pub mod storage;
pub mod tracker;
pub mod types;

pub use error::{CostError, Result};
pub use pricing::{ModelPricing, PricingTable, IMAGE_PRICE};
pub use storage::{CachedStore, InMemoryStore, KeyValueStore, StorageError};
pub use tracker::{aggregate_key, entry_key, CostTracker};
pub use types::{
    CallDetails, CostEntry, CostLimits, LimitCheck, LimitKind, LimitViolation, Operation,
    SessionCosts,
};
