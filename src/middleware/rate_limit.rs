use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::{broadcast, Mutex};

use crate::config::RateLimitConfig;
use crate::response::AppError;
use crate::state::AppState;

const PRUNE_EVERY: Duration = Duration::from_secs(300);


/// Budget a request is counted against. Review submissions are the hot path
/// of a study session and get their own window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitScope {
    Api,
    Reviews,
}

impl LimitScope {
    /// `None` for paths outside `/api` (health checks, fallback).
    pub fn for_path(path: &str) -> Option<Self> {
        if path == "/api/reviews" || path.starts_with("/api/reviews/") {
            Some(Self::Reviews)
        } else if path.starts_with("/api/") {
            Some(Self::Api)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Reviews => "reviews",
        }
    }
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Whole seconds until the window reopens, rounded up.
    pub reset_after_secs: u64,
}

#[derive(Debug)]
struct Window {
    opened_at: Instant,
    used: u64,
}

/// Fixed-window counter keyed by client address and scope.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    api_max: u64,
    reviews_max: u64,
    windows: Mutex<HashMap<(IpAddr, LimitScope), Window>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            window: Duration::from_secs(config.window_secs.max(1)),
            api_max: config.api_max_requests,
            reviews_max: config.review_max_requests,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit_for(&self, scope: LimitScope) -> u64 {
        match scope {
            LimitScope::Api => self.api_max,
            LimitScope::Reviews => self.reviews_max,
        }
    }

    pub async fn acquire(&self, client: IpAddr, scope: LimitScope) -> Quota {
        self.acquire_at(client, scope, Instant::now()).await
    }

    async fn acquire_at(&self, client: IpAddr, scope: LimitScope, now: Instant) -> Quota {
        let limit = self.limit_for(scope);
        let mut windows = self.windows.lock().await;
        let window = windows.entry((client, scope)).or_insert(Window {
            opened_at: now,
            used: 0,
        });

        if now.saturating_duration_since(window.opened_at) >= self.window {
            window.opened_at = now;
            window.used = 0;
        }

        let allowed = window.used < limit;
        if allowed {
            window.used += 1;
        }

        let left = self
            .window
            .saturating_sub(now.saturating_duration_since(window.opened_at));
        Quota {
            allowed,
            limit,
            remaining: limit.saturating_sub(window.used),
            reset_after_secs: left.as_secs() + u64::from(left.subsec_nanos() > 0),
        }
    }

    /// Drops windows that have already closed. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        self.prune_at(Instant::now()).await
    }

    async fn prune_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| now.saturating_duration_since(w.opened_at) < self.window);
        before - windows.len()
    }
}

/// Counts `/api` requests per client and scope; everything else passes through.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(scope) = LimitScope::for_path(req.uri().path()) else {
        return next.run(req).await;
    };

    let client = client_ip(&req, state.config().server.trust_proxy);
    let quota = state.rate_limiter().acquire(client, scope).await;

    if !quota.allowed {
        tracing::warn!(%client, scope = scope.as_str(), limit = quota.limit, "Rate limit exceeded");
        let mut response =
            AppError::too_many_requests("Too many requests, slow down").into_response();
        set_quota_headers(response.headers_mut(), &quota);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(quota.reset_after_secs));
        return response;
    }

    let mut response = next.run(req).await;
    set_quota_headers(response.headers_mut(), &quota);
    response
}

fn set_quota_headers(headers: &mut HeaderMap, quota: &Quota) {
    headers.insert("ratelimit-limit", HeaderValue::from(quota.limit));
    headers.insert("ratelimit-remaining", HeaderValue::from(quota.remaining));
    headers.insert("ratelimit-reset", HeaderValue::from(quota.reset_after_secs));
}

/// Proxy headers first when trusted, then the socket peer, then loopback.
pub fn client_ip(req: &Request, trust_proxy: bool) -> IpAddr {
    if trust_proxy {
        if let Some(ip) = forwarded_ip(req.headers()) {
            return ip;
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let first_forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());
    first_forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
}

pub async fn prune_rate_limit_windows(state: AppState, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(PRUNE_EVERY);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = state.rate_limiter().prune().await;
                if removed > 0 {
                    tracing::debug!(removed, "Pruned closed rate limit windows");
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn limiter(api: u64, reviews: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            window_secs: 60,
            api_max_requests: api,
            review_max_requests: reviews,
        })
    }

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    #[test]
    fn scope_follows_path() {
        assert_eq!(LimitScope::for_path("/api/reviews"), Some(LimitScope::Reviews));
        assert_eq!(LimitScope::for_path("/api/reviews/due"), Some(LimitScope::Reviews));
        assert_eq!(LimitScope::for_path("/api/reviewsx"), Some(LimitScope::Api));
        assert_eq!(LimitScope::for_path("/api/flashcards/1"), Some(LimitScope::Api));
        assert_eq!(LimitScope::for_path("/health/live"), None);
    }

    #[tokio::test]
    async fn scopes_have_separate_budgets() {
        let limiter = limiter(1, 2);
        let client = ip("10.0.0.1");

        assert!(limiter.acquire(client, LimitScope::Api).await.allowed);
        assert!(!limiter.acquire(client, LimitScope::Api).await.allowed);

        let first = limiter.acquire(client, LimitScope::Reviews).await;
        assert!(first.allowed);
        assert_eq!((first.limit, first.remaining), (2, 1));
        assert!(limiter.acquire(client, LimitScope::Reviews).await.allowed);
        assert!(!limiter.acquire(client, LimitScope::Reviews).await.allowed);
    }

    #[tokio::test]
    async fn clients_are_counted_separately() {
        let limiter = limiter(1, 1);
        assert!(limiter.acquire(ip("10.0.0.1"), LimitScope::Api).await.allowed);
        let other = limiter.acquire(ip("10.0.0.2"), LimitScope::Api).await;
        assert!(other.allowed);
        assert_eq!(other.remaining, 0);
    }

    #[tokio::test]
    async fn window_reopens_and_reset_counts_down() {
        let limiter = limiter(1, 1);
        let client = ip("10.0.0.3");
        let start = Instant::now();

        let quota = limiter.acquire_at(client, LimitScope::Api, start).await;
        assert_eq!(quota.reset_after_secs, 60);

        let later = start + Duration::from_millis(20_500);
        let blocked = limiter.acquire_at(client, LimitScope::Api, later).await;
        assert!(!blocked.allowed);
        assert_eq!(blocked.reset_after_secs, 40);

        let reopened = start + Duration::from_secs(60);
        assert!(limiter.acquire_at(client, LimitScope::Api, reopened).await.allowed);
    }

    #[tokio::test]
    async fn prune_drops_closed_windows_only() {
        let limiter = limiter(5, 5);
        let start = Instant::now();
        limiter.acquire_at(ip("10.0.0.4"), LimitScope::Api, start).await;
        limiter
            .acquire_at(ip("10.0.0.5"), LimitScope::Reviews, start + Duration::from_secs(30))
            .await;

        assert_eq!(limiter.prune_at(start + Duration::from_secs(61)).await, 1);
        assert_eq!(limiter.windows.lock().await.len(), 1);
    }

    fn request_with(headers: &[(&str, &str)], peer: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/api/flashcards");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            req.extensions_mut()
                .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        }
        req
    }

    #[test]
    fn forwarded_headers_need_trust() {
        let req = request_with(
            &[("x-forwarded-for", "10.0.0.7, 10.0.0.1"), ("x-real-ip", "10.0.0.9")],
            Some("192.168.1.2:5000"),
        );
        assert_eq!(client_ip(&req, true), ip("10.0.0.7"));
        assert_eq!(client_ip(&req, false), ip("192.168.1.2"));

        let req = request_with(&[("x-real-ip", "10.0.0.9")], None);
        assert_eq!(client_ip(&req, true), ip("10.0.0.9"));
        assert_eq!(client_ip(&req, false), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}
