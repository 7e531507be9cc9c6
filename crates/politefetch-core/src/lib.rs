//! # Politefetch Core
//!
//! A polite, concurrent HTTP fetching client.
//!
//! ## Overview
//!
//! Every request issued by a [`Client`] passes through the same pipeline:
//!
//! - **Concurrency gate** caps simultaneous transport calls
//! - **Rate governor** spaces request departures by a minimum delay
//! - **Robots policy cache** honors per-origin `robots.txt` rules
//! - **Identity profile** stamps an ordered, browser-like header set
//! - **Retry policy** classifies failures and backs off with jitter
//!
//! Failures never surface as `Err` from a fetch; they are reported inside
//! [`FetchResult::error`] so a batch can partially succeed.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cancel`] | Cancellation tokens with optional deadlines |
//! | [`config`] | Client configuration and validation |
//! | [`engine`] | The fetch state machine and [`Client`] |
//! | [`error`] | Configuration and fetch errors |
//! | [`gate`] | Concurrency gate |
//! | [`identity`] | Identity profiles and TLS fingerprint ids |
//! | [`rate`] | Minimum-spacing rate governor |
//! | [`request`] | Request and result types |
//! | [`retry`] | Backoff and retry decisions |
//! | [`robots`] | Robots.txt policy cache |
//! | [`transport`] | HTTP transport abstraction |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use politefetch_core::{new_client, ClientConfig, FetchRequest, IdentityProfile};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::default()
//!         .with_request_delay(Duration::from_millis(500))
//!         .with_max_concurrent_requests(2);
//!     let client = new_client(config, IdentityProfile::firefox())?;
//!
//!     let results = client
//!         .fetch_many(vec![
//!             FetchRequest::new("https://example.com/"),
//!             FetchRequest::new("https://example.com/about"),
//!         ])
//!         .await;
//!
//!     for result in results {
//!         match result.error {
//!             None => println!("{} -> {:?}", result.url, result.status_code),
//!             Some(error) => println!("{} failed: {error}", result.url),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  FetchRequest   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Concurrency     │────▶│ Rate Governor    │
//! │ Gate            │     └────────┬─────────┘
//! └─────────────────┘              │
//!                                  ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Retry Policy    │◀────│ Robots Policy    │
//! │ (backoff)       │     │ Cache            │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Identity        │────▶│ Transport        │
//! │ Profile         │     │ (reqwest/mock)   │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use politefetch_core::{FetchErrorKind, FetchResult};
//!
//! fn report(result: &FetchResult) {
//!     match result.error.as_ref().map(|error| error.kind()) {
//!         None => {}
//!         Some(FetchErrorKind::PolicyDenied) => {
//!             // robots.txt said no; do not try again
//!         }
//!         Some(FetchErrorKind::HttpStatus(status)) => {
//!             eprintln!("server answered {status}");
//!         }
//!         Some(_) => {}
//!     }
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod identity;
pub mod rate;
pub mod request;
pub mod retry;
pub mod robots;
pub mod transport;

// Cancellation
pub use cancel::CancelToken;

// Configuration
pub use config::{ClientConfig, DEFAULT_ROBOTS_TTL};

// Engine
pub use engine::{new_client, Client, FetchState};

// Error types
pub use error::{ConfigurationError, FetchError, FetchErrorKind};

// Politeness primitives
pub use gate::{ConcurrencyGate, GatePermit};
pub use rate::RateGovernor;
pub use robots::{RobotsPolicyCache, RobotsSource, RobotsVerdict};

// Identity
pub use identity::{H2Settings, HttpVersionPreference, IdentityProfile, TlsProfile};

// Request/result types
pub use request::{FetchRequest, FetchResult};

// Retry logic
pub use retry::{parse_retry_after, Backoff, RetryDecision, RetryPolicy};

// Transport types
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError,
    TransportErrorKind,
};
