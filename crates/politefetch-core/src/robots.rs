//! Per-origin robots.txt permissions.
//!
//! The cache never fails publicly: a robots.txt that cannot be fetched,
//! answers with a non-2xx status, or cannot be parsed allows everything.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use texting_robots::Robot;
use tokio::time::Instant;
use url::Url;

/// Narrow handle used to retrieve robots.txt bodies.
///
/// Implementations return the body of a successful (2xx) response and `None`
/// for anything else.
pub trait RobotsSource: Send + Sync {
    fn fetch_robots<'a>(
        &'a self,
        robots_url: String,
    ) -> Pin<Box<dyn Future<Output = Option<Vec<u8>>> + Send + 'a>>;
}

/// Result of one permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobotsVerdict {
    pub allowed: bool,
    /// Whether this check had to go to the network for a fresh robots.txt.
    pub consulted_network: bool,
}

struct RobotsRule {
    origin: String,
    /// `None` means allow all.
    robot: Option<Robot>,
    fetched_at: Instant,
    ttl: Duration,
}

impl RobotsRule {
    fn parse(origin: &str, user_agent: &str, body: Option<Vec<u8>>, ttl: Duration) -> Self {
        let robot = body.and_then(|body| match Robot::new(user_agent, &body) {
            Ok(robot) => Some(robot),
            Err(error) => {
                tracing::debug!(origin, %error, "robots.txt unparseable; allowing all");
                None
            }
        });

        Self {
            origin: origin.to_string(),
            robot,
            fetched_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) > self.ttl
    }

    fn allows(&self, path: &str) -> bool {
        self.robot.as_ref().map_or(true, |robot| robot.allowed(path))
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<RobotsRule>>>;

/// Origin-keyed robots.txt cache owned by a single client.
///
/// Each origin has its own async slot; concurrent first queries for the same
/// origin queue on that slot, so only one robots.txt fetch is in flight per
/// origin.
pub struct RobotsPolicyCache {
    source: Arc<dyn RobotsSource>,
    user_agent: String,
    ttl: Duration,
    entries: Mutex<HashMap<String, Slot>>,
}

impl RobotsPolicyCache {
    pub fn new(source: Arc<dyn RobotsSource>, user_agent: impl Into<String>, ttl: Duration) -> Self {
        Self {
            source,
            user_agent: user_agent.into(),
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether `path` on `origin` (e.g. `https://example.com`) may be fetched.
    pub async fn may_fetch(&self, origin: &str, path: &str) -> bool {
        self.verdict(origin.trim_end_matches('/'), path).await.allowed
    }

    /// Permission check for a full URL. Non-http(s) URLs are always allowed.
    pub async fn check(&self, url: &Url) -> RobotsVerdict {
        if !matches!(url.scheme(), "http" | "https") {
            return RobotsVerdict {
                allowed: true,
                consulted_network: false,
            };
        }

        let origin = url.origin().ascii_serialization();
        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        self.verdict(&origin, &path).await
    }

    /// Drops every cached rule; the next query per origin refetches.
    pub fn clear(&self) {
        self.entries
            .lock()
            .expect("robots cache lock is not poisoned")
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("robots cache lock is not poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, origin: &str) -> Slot {
        let mut entries = self
            .entries
            .lock()
            .expect("robots cache lock is not poisoned");
        entries
            .entry(origin.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone()
    }

    async fn verdict(&self, origin: &str, path: &str) -> RobotsVerdict {
        let slot = self.slot(origin);
        let mut entry = slot.lock().await;

        let stale = entry
            .as_ref()
            .map_or(true, |rule| rule.is_expired(Instant::now()));
        let consulted_network = stale;
        if stale {
            let robots_url = format!("{origin}/robots.txt");
            tracing::debug!(origin, robots_url = %robots_url, "refreshing robots.txt");
            let body = self.source.fetch_robots(robots_url).await;
            let rule = RobotsRule::parse(origin, &self.user_agent, body, self.ttl);
            tracing::trace!(origin = %rule.origin, restricted = rule.robot.is_some(), "robots rule cached");
            *entry = Some(rule);
        }

        let allowed = entry.as_ref().map_or(true, |rule| rule.allows(path));
        RobotsVerdict {
            allowed,
            consulted_network,
        }
    }
}

impl std::fmt::Debug for RobotsPolicyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotsPolicyCache")
            .field("user_agent", &self.user_agent)
            .field("ttl", &self.ttl)
            .field("origins", &self.len())
            .finish()
    }
}
