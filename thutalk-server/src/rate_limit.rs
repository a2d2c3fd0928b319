use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Simple in-memory rate limiter
/// Tracks requests per caller with a sliding window. Authenticated
/// requests are keyed by session token; anonymous ones (login, register)
/// fall back to the client address so those endpoints are covered too.
#[derive(Clone)]
pub struct RateLimiter {
    // Map of caller key -> (request_count, window_start)
    state: Arc<Mutex<HashMap<String, (u32, Instant)>>>,
    max_requests: u32,
    window_duration: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window_duration: Duration::from_secs(window_seconds),
        }
    }

    /// Check if a request should be allowed
    pub fn check_rate_limit(&self, key: &str) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();

        // Keep the map bounded
        if state.len() > 10000 {
            state.retain(|_, (_, start)| now.duration_since(*start) < self.window_duration * 2);
        }

        match state.get_mut(key) {
            Some((count, window_start)) => {
                if now.duration_since(*window_start) < self.window_duration {
                    if *count >= self.max_requests {
                        let remaining = self.window_duration - now.duration_since(*window_start);
                        return Err(format!(
                            "Rate limit exceeded. Try again in {} seconds.",
                            remaining.as_secs()
                        ));
                    }
                    *count += 1;
                } else {
                    // New window
                    *window_start = now;
                    *count = 1;
                }
            }
            None => {
                state.insert(key.to_string(), (1, now));
            }
        }

        Ok(())
    }
}

/// Middleware to apply rate limiting to all requests
pub async fn rate_limit_middleware(
    axum::Extension(limiter): axum::Extension<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let key = request
        .headers()
        .get("X-Session-Token")
        .and_then(|v| v.to_str().ok())
        .map(|token| format!("token:{token}"))
        .or_else(|| {
            request
                .extensions()
                .get::<axum::extract::ConnectInfo<SocketAddr>>()
                .map(|info| format!("addr:{}", info.0.ip()))
        });

    if let Some(key) = key {
        if let Err(msg) = limiter.check_rate_limit(&key) {
            return Ok((
                StatusCode::TOO_MANY_REQUESTS,
                format!("{{\"error\": \"{}\"}}", msg),
            )
                .into_response());
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_enforced_within_window() {
        let limiter = RateLimiter::new(3, 60);

        for _ in 0..3 {
            assert!(limiter.check_rate_limit("token:abc").is_ok());
        }
        assert!(limiter.check_rate_limit("token:abc").is_err());
        // A different caller has its own window
        assert!(limiter.check_rate_limit("addr:10.0.0.1").is_ok());
    }

    #[test]
    fn test_window_reset() {
        let limiter = RateLimiter::new(1, 0);

        assert!(limiter.check_rate_limit("token:abc").is_ok());
        // Zero-length window expires immediately, so the next request opens
        // a fresh one instead of being rejected
        assert!(limiter.check_rate_limit("token:abc").is_ok());
    }
}
