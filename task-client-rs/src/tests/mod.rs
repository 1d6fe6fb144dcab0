//! HTTP-level tests for the task client
//!
//! Agents are simulated with WireMock servers.

pub mod support;
