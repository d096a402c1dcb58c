//! Per-client token buckets for the REST API.

use std::collections::HashMap;
use std::hash::Hash;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

impl Bucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            refilled_at: now,
        }
    }

    fn take(&mut self, rate: f64, capacity: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();
        self.refilled_at = now;
        self.tokens = (self.tokens + elapsed * rate).min(capacity);

        if self.tokens < 1.0 {
            return false;
        }
        self.tokens -= 1.0;
        true
    }
}

/// Token-bucket limiter keyed by client. `rate` tokens per second refill a
/// bucket of `capacity`; each request takes one.
#[derive(Clone)]
pub struct RateLimiter<K = IpAddr> {
    buckets: Arc<Mutex<HashMap<K, Bucket>>>,
    rate: f64,
    capacity: f64,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            rate,
            capacity: capacity.max(1.0),
        }
    }

    pub async fn check(&self, key: K) -> bool {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: K, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(key)
            .or_insert_with(|| Bucket::full(self.capacity, now))
            .take(self.rate, self.capacity, now)
    }

    /// Forget clients idle for longer than `max_idle`. Returns how many were
    /// dropped.
    pub async fn purge_stale(&self, max_idle: Duration) -> usize {
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        let now = Instant::now();
        buckets.retain(|_, b| now.saturating_duration_since(b.refilled_at) < max_idle);
        before - buckets.len()
    }

    #[cfg(test)]
    pub async fn tracked(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

impl RateLimiter<IpAddr> {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.rate_limit_per_sec, config.rate_limit_burst)
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let Some(ip) = client_ip(&req) else {
        debug!(path = %req.uri().path(), "No client address, skipping rate limit");
        return Ok(next.run(req).await);
    };

    if !limiter.check(ip).await {
        warn!(ip = %ip, path = %req.uri().path(), "Rate limit exceeded");
        return Err(ServerError::RateLimited);
    }

    Ok(next.run(req).await)
}

/// Peer address first, then `X-Forwarded-For`, then `X-Real-IP`.
fn client_ip<B>(req: &axum::http::Request<B>) -> Option<IpAddr> {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip());
    }

    header_str(req, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .or_else(|| header_str(req, "x-real-ip").and_then(|v| v.trim().parse().ok()))
}

fn header_str<'a, B>(req: &'a axum::http::Request<B>, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_then_reject() {
        let limiter = RateLimiter::new(10.0, 5.0);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.check_at(ip, now).await);
        }
        assert!(!limiter.check_at(ip, now).await);
    }

    #[tokio::test]
    async fn test_refill_over_time() {
        let limiter = RateLimiter::new(2.0, 1.0);
        let now = Instant::now();

        assert!(limiter.check_at("tenant", now).await);
        assert!(!limiter.check_at("tenant", now).await);
        assert!(limiter.check_at("tenant", now + Duration::from_millis(600)).await);
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let limiter = RateLimiter::new(10.0, 2.0);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        let now = Instant::now();

        assert!(limiter.check_at(a, now).await);
        assert!(limiter.check_at(a, now).await);
        assert!(!limiter.check_at(a, now).await);
        assert!(limiter.check_at(b, now).await);
    }

    #[tokio::test]
    async fn test_purge_stale() {
        let limiter = RateLimiter::new(10.0, 5.0);
        assert!(limiter.check("192.168.1.1".parse::<IpAddr>().unwrap()).await);

        assert_eq!(limiter.purge_stale(Duration::ZERO).await, 1);
        assert_eq!(limiter.tracked().await, 0);
    }

    #[test]
    fn test_client_ip_from_forwarded_header() {
        let req = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_ip(&req), Some("203.0.113.7".parse().unwrap()));

        let req = axum::http::Request::builder()
            .header("x-real-ip", "198.51.100.2")
            .body(())
            .unwrap();
        assert_eq!(client_ip(&req), Some("198.51.100.2".parse().unwrap()));
    }
}
