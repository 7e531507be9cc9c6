//! The fetch engine.
//!
//! A logical fetch moves through
//! `Pending -> Admitted -> RateCleared -> InFlight -> Succeeded | FailedRetryable | FailedTerminal`,
//! and `FailedRetryable` loops back to `Pending` after a backoff delay. The
//! concurrency permit is held for one attempt only, never across a backoff
//! wait.
//!
//! Robots.txt is consulted between admission and rate clearance. A fresh
//! robots.txt download takes its own departure slot from the governor under
//! the caller's permit, so every governor slot carries exactly one transport
//! call.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::join_all;
use time::OffsetDateTime;
use tokio::time::Instant;
use url::Url;

use crate::cancel::CancelToken;
use crate::config::ClientConfig;
use crate::error::{ConfigurationError, FetchError, FetchErrorKind};
use crate::gate::ConcurrencyGate;
use crate::identity::{validate_header, IdentityProfile};
use crate::rate::RateGovernor;
use crate::request::{FetchRequest, FetchResult};
use crate::retry::{parse_retry_after, RetryDecision, RetryPolicy, RetryStrategy};
use crate::robots::{RobotsPolicyCache, RobotsSource};
use crate::transport::{
    HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportErrorKind,
};

/// Lifecycle states of one logical fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Pending,
    Admitted,
    RateCleared,
    InFlight,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
}

impl FetchState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Admitted => "admitted",
            Self::RateCleared => "rate_cleared",
            Self::InFlight => "in_flight",
            Self::Succeeded => "succeeded",
            Self::FailedRetryable => "failed_retryable",
            Self::FailedTerminal => "failed_terminal",
        }
    }
}

impl Display for FetchState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a client over the production reqwest transport.
pub fn new_client(
    config: ClientConfig,
    identity: IdentityProfile,
) -> Result<Client, ConfigurationError> {
    Client::new(config, identity)
}

/// Knobs that differ between caller fetches and robots.txt lookups.
struct FetchPlan<'a> {
    retry: &'a dyn RetryStrategy,
    /// `false` when the caller already holds a permit covering this fetch.
    admit: bool,
    robots: Option<&'a RobotsPolicyCache>,
}

enum AttemptOutcome {
    Response(HttpResponse),
    Failed(FetchError),
    Denied,
    Cancelled,
}

/// Shared state behind every handle of one client.
struct EngineCore {
    config: ClientConfig,
    identity: IdentityProfile,
    transport: Arc<dyn Transport>,
    gate: ConcurrencyGate,
    governor: RateGovernor,
    retry: RetryPolicy,
}

impl EngineCore {
    async fn run(
        &self,
        request: FetchRequest,
        plan: FetchPlan<'_>,
        cancel: &CancelToken,
    ) -> FetchResult {
        let started = Instant::now();
        let url = match parse_target(request.url()) {
            Ok(url) => url,
            Err(error) => {
                tracing::debug!(url = request.url(), state = %FetchState::FailedTerminal, %error, "rejected before admission");
                return FetchResult::failed(&request, error, started.elapsed());
            }
        };

        if let Err(error) = check_caller_headers(&request) {
            tracing::debug!(url = request.url(), state = %FetchState::FailedTerminal, %error, "rejected before admission");
            return FetchResult::failed(&request, error, started.elapsed());
        }

        let mut attempt: u32 = 0;
        loop {
            tracing::trace!(url = request.url(), attempt, state = %FetchState::Pending, "attempt queued");

            let (error, response) = match self.attempt(&request, &url, &plan, cancel, attempt).await {
                AttemptOutcome::Response(response) if response.is_success() => {
                    tracing::debug!(url = request.url(), attempt, status = response.status, state = %FetchState::Succeeded, "fetch succeeded");
                    return FetchResult::succeeded(
                        &request,
                        response.status,
                        response.headers,
                        response.body,
                        attempt + 1,
                        started.elapsed(),
                    );
                }
                AttemptOutcome::Response(response) => {
                    let retry_after = response
                        .header("retry-after")
                        .and_then(|value| parse_retry_after(value, OffsetDateTime::now_utc()));
                    let error = FetchError::http_status(request.url(), response.status)
                        .with_attempts(attempt + 1)
                        .with_retry_after(retry_after);
                    (error, Some(response))
                }
                AttemptOutcome::Failed(error) => (error.with_attempts(attempt + 1), None),
                AttemptOutcome::Denied => {
                    tracing::debug!(url = request.url(), state = %FetchState::FailedTerminal, "denied by robots.txt");
                    let error = FetchError::policy_denied(request.url()).with_attempts(attempt);
                    return FetchResult::failed(&request, error, started.elapsed());
                }
                AttemptOutcome::Cancelled => {
                    return self.cancelled(&request, attempt, started);
                }
            };

            match plan.retry.should_retry(attempt, &error) {
                RetryDecision::RetryAfter(delay) => {
                    tracing::debug!(url = request.url(), attempt, kind = %error.kind(), delay_ms = delay.as_millis() as u64, state = %FetchState::FailedRetryable, "retrying after backoff");
                    if or_cancel(cancel, tokio::time::sleep(delay)).await.is_none() {
                        return self.cancelled(&request, attempt + 1, started);
                    }
                    attempt += 1;
                }
                RetryDecision::GiveUp => {
                    tracing::debug!(url = request.url(), attempt, kind = %error.kind(), state = %FetchState::FailedTerminal, "giving up");
                    let elapsed = started.elapsed();
                    return match response {
                        Some(response) => FetchResult::rejected(
                            &request,
                            response.status,
                            response.headers,
                            response.body,
                            error,
                            elapsed,
                        ),
                        None => FetchResult::failed(&request, error, elapsed),
                    };
                }
            }
        }
    }

    /// One pass through admission, robots, rate clearance and transport.
    /// The permit taken here drops when this returns.
    async fn attempt(
        &self,
        request: &FetchRequest,
        url: &Url,
        plan: &FetchPlan<'_>,
        cancel: &CancelToken,
        attempt: u32,
    ) -> AttemptOutcome {
        let _permit = if plan.admit {
            match or_cancel(cancel, self.gate.admit()).await {
                Some(Ok(permit)) => Some(permit),
                Some(Err(_)) | None => return AttemptOutcome::Cancelled,
            }
        } else {
            None
        };
        tracing::trace!(url = request.url(), attempt, state = %FetchState::Admitted, in_use = self.gate.in_use());

        if let Some(robots) = plan.robots {
            match or_cancel(cancel, robots.check(url)).await {
                Some(verdict) if verdict.allowed => {}
                Some(_) => return AttemptOutcome::Denied,
                None => return AttemptOutcome::Cancelled,
            }
        }

        if or_cancel(cancel, self.governor.acquire()).await.is_none() {
            return AttemptOutcome::Cancelled;
        }
        tracing::trace!(url = request.url(), attempt, state = %FetchState::RateCleared);

        tracing::trace!(url = request.url(), attempt, state = %FetchState::InFlight);
        let outbound = self.identity.apply(to_http_request(request));
        match or_cancel(cancel, self.transmit(outbound)).await {
            Some(Ok(response)) => AttemptOutcome::Response(response),
            Some(Err(error)) => AttemptOutcome::Failed(error),
            None => AttemptOutcome::Cancelled,
        }
    }

    async fn transmit(&self, request: HttpRequest) -> Result<HttpResponse, FetchError> {
        let url = request.url.clone();
        match tokio::time::timeout(self.config.timeout, self.transport.execute(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) => {
                let kind = match error.kind() {
                    TransportErrorKind::Timeout => FetchErrorKind::Timeout,
                    TransportErrorKind::Tls => FetchErrorKind::TlsFailure,
                    TransportErrorKind::InvalidRequest => FetchErrorKind::InvalidRequest,
                    TransportErrorKind::Connect | TransportErrorKind::Other => {
                        FetchErrorKind::ConnectionFailed
                    }
                };
                Err(FetchError::new(kind, url, error.message()))
            }
            Err(_) => Err(FetchError::new(
                FetchErrorKind::Timeout,
                url,
                format!("no response within {:?}", self.config.timeout),
            )),
        }
    }

    fn cancelled(&self, request: &FetchRequest, attempts: u32, started: Instant) -> FetchResult {
        tracing::debug!(url = request.url(), attempts, state = %FetchState::FailedTerminal, "fetch cancelled");
        let error = FetchError::cancelled(request.url()).with_attempts(attempts);
        FetchResult::failed(request, error, started.elapsed())
    }
}

/// Robots.txt handle that goes through the engine with robots checks off and
/// no retries. Every caller of the cache already holds a concurrency permit,
/// so this handle does not ask for a second one; it still waits for its own
/// governor slot.
struct RestrictedFetcher {
    core: Arc<EngineCore>,
}

impl RobotsSource for RestrictedFetcher {
    fn fetch_robots<'a>(
        &'a self,
        robots_url: String,
    ) -> Pin<Box<dyn Future<Output = Option<Vec<u8>>> + Send + 'a>> {
        Box::pin(async move {
            let no_retry = RetryPolicy::no_retry();
            let plan = FetchPlan {
                retry: &no_retry,
                admit: false,
                robots: None,
            };
            let result = self
                .core
                .run(FetchRequest::get(robots_url), plan, &CancelToken::new())
                .await;

            if result.is_success() {
                Some(result.body)
            } else {
                tracing::debug!(url = %result.url, status = ?result.status_code, "robots.txt unavailable; allowing all");
                None
            }
        })
    }
}

/// Polite fetch client. Cheap to clone; clones share gates, governor and
/// robots cache.
#[derive(Clone)]
pub struct Client {
    core: Arc<EngineCore>,
    robots: Arc<RobotsPolicyCache>,
}

impl Client {
    pub fn new(config: ClientConfig, identity: IdentityProfile) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let transport = ReqwestTransport::new(&identity, config.timeout)?;
        Self::with_transport(config, identity, Arc::new(transport))
    }

    /// Builds a client over any transport, e.g. a scripted one in tests.
    pub fn with_transport(
        config: ClientConfig,
        identity: IdentityProfile,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;

        let core = Arc::new(EngineCore {
            gate: ConcurrencyGate::new(config.max_concurrent_requests),
            governor: RateGovernor::new(config.request_delay),
            retry: RetryPolicy::from_config(&config),
            identity,
            transport,
            config,
        });
        let robots = Arc::new(RobotsPolicyCache::new(
            Arc::new(RestrictedFetcher { core: core.clone() }),
            core.config.user_agent_label.clone(),
            core.config.robots_ttl,
        ));

        Ok(Self { core, robots })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.core.config
    }

    pub fn identity(&self) -> &IdentityProfile {
        &self.core.identity
    }

    /// Origins with a cached robots.txt verdict.
    pub fn robots_cache_len(&self) -> usize {
        self.robots.len()
    }

    /// Forgets every cached robots.txt; the next fetch per origin refetches.
    pub fn clear_robots_cache(&self) {
        self.robots.clear();
    }

    /// Transport calls currently holding a concurrency permit.
    pub fn in_flight(&self) -> usize {
        self.core.gate.in_use()
    }

    /// Runs one logical fetch. Network and HTTP failures come back inside
    /// `FetchResult::error`; this never panics or returns `Err`.
    pub async fn fetch(&self, request: FetchRequest) -> FetchResult {
        self.fetch_with_cancel(request, &CancelToken::new()).await
    }

    pub async fn fetch_with_cancel(&self, request: FetchRequest, cancel: &CancelToken) -> FetchResult {
        let plan = FetchPlan {
            retry: &self.core.retry,
            admit: true,
            robots: self.core.config.respect_robots.then_some(&*self.robots),
        };
        self.core.run(request, plan, cancel).await
    }

    /// Runs every request concurrently through the shared gate and governor.
    /// Results come back in input order; match them by `request_id`.
    pub async fn fetch_many(&self, requests: Vec<FetchRequest>) -> Vec<FetchResult> {
        self.fetch_many_with_cancel(requests, &CancelToken::new()).await
    }

    pub async fn fetch_many_with_cancel(
        &self,
        requests: Vec<FetchRequest>,
        cancel: &CancelToken,
    ) -> Vec<FetchResult> {
        join_all(
            requests
                .into_iter()
                .map(|request| self.fetch_with_cancel(request, cancel)),
        )
        .await
    }

    /// Robots verdict for `url` as this client would apply it.
    ///
    /// Takes a concurrency permit like any fetch, since a cache miss downloads
    /// robots.txt.
    pub async fn may_fetch(&self, url: &str) -> bool {
        let Ok(url) = Url::parse(url) else {
            return true;
        };
        let Ok(_permit) = self.core.gate.admit().await else {
            return true;
        };
        self.robots.check(&url).await.allowed
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.core.config)
            .field("identity", &self.core.identity.name())
            .field("robots", &self.robots)
            .finish()
    }
}

fn parse_target(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw).map_err(|error| FetchError::invalid_url(raw, error.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        "http" | "https" => Err(FetchError::invalid_url(raw, "url has no host")),
        scheme => Err(FetchError::invalid_url(
            raw,
            format!("unsupported scheme '{scheme}', expected http or https"),
        )),
    }
}

fn check_caller_headers(request: &FetchRequest) -> Result<(), FetchError> {
    for (name, value) in request.extra_headers() {
        validate_header(name, value)
            .map_err(|error| FetchError::invalid_request(request.url(), error.to_string()))?;
    }
    Ok(())
}

fn to_http_request(request: &FetchRequest) -> HttpRequest {
    let mut outbound = HttpRequest::new(request.method(), request.url());
    outbound.headers = request.extra_headers().to_vec();
    outbound.body = request.body().map(<[u8]>::to_vec);
    outbound
}

async fn or_cancel<F>(cancel: &CancelToken, future: F) -> Option<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = future => Some(output),
    }
}
