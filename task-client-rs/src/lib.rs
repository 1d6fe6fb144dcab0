//! # Task Client
//!
//! Dispatches units of work to remote agent services.
//!
//! A [`TaskClient`] is bound to one agent base URL and picks its wire
//! protocol once, at construction:
//!
//! - **Negotiated**: the agent publishes a card at
//!   `/.well-known/agent-card`; tasks go to the card's endpoint as JSON-RPC
//!   `message/send` calls.
//! - **Fallback**: tasks go to `POST {base}/task` as plain JSON.
//!
//! Requests to `https` agents carry a service identity token when an
//! identity source is configured. Every call is delivered at most once;
//! failures come back as a classified [`TaskError`].

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod protocol;
pub mod types;

#[cfg(test)]
mod tests;

pub use client::{TaskClient, TaskClientBuilder};
pub use config::{ProtocolPreference, TaskClientConfig, UserAgent};
pub use credentials::TokenProvider;
pub use error::{Result, TaskError};
pub use protocol::Protocol;
pub use types::{AgentCard, AgentSkill, MetricValue, TaskRequest, TaskResponse};

// Callers pass cancellation tokens into `execute_with_cancellation`
pub use tokio_util::sync::CancellationToken;
