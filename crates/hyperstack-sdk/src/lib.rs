//! Client library for the Hyperstack (Infrahub) cluster API.
//!
//! Provides the HTTP layer used by the cluster-autoscaler cloud provider:
//! a retrying transport with exponential backoff and method-aware deadlines,
//! typed endpoint calls for the cluster / node-group / node resources, and
//! the payload models those endpoints exchange.

pub mod client;
pub mod models;
pub mod retry;
pub mod time;

pub use client::{ApiResponse, HyperstackClient, SdkError};
pub use retry::{
    HttpClientError, HttpTransport, RetryConfig, RetryingHttpClient, TimeoutConfig, TransportError,
};
pub use time::ApiTimestamp;
