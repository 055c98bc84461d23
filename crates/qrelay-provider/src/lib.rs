//! Client layer for the remote quantum execution provider.
//!
//! Two pieces:
//!
//! - [`TokenCache`]: obtains a bearer token via an apikey credential
//!   grant and caches it until shortly before expiry. Injectable, no
//!   process-global state; concurrent refreshes collapse into a single
//!   in-flight exchange.
//! - [`ProviderClient`]: thin RPC wrapper over the provider's REST
//!   API (submit job, fetch status/result envelope, list devices),
//!   attaching auth headers from the cache. The [`Provider`] trait is
//!   the seam callers depend on, so tests and alternative transports
//!   can substitute their own implementation.
//!
//! The wire contract is the IBM Quantum Runtime primitives API (V2);
//! endpoints are configurable for testing.

pub mod auth;
pub mod client;
pub mod error;

pub use auth::{AuthConfig, TokenCache};
pub use client::{
    DeviceInfo, Provider, ProviderClient, ProviderConfig, SubmitInputs, SubmitRequest,
    SubmitResponse,
};
pub use error::{ProviderError, ProviderResult};
