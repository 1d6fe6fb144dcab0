//! HTTP-level tests for the auth subsystem
//!
//! Metadata and key endpoints are simulated with WireMock; tokens are signed
//! with the fixed RSA keys under `fixtures/`.

pub mod support;
pub mod identity_mock_tests;
