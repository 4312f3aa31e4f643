use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use super::auth::decode_claims;

const WINDOW: Duration = Duration::from_secs(1);
const ANONYMOUS: &str = "anonymous";

#[derive(Debug)]
struct WindowState {
    start: Instant,
    count: u32,
}

/// Fixed one-second windows, one per verified token subject, so a client
/// flooding progress writes does not starve other learners. Requests without
/// a valid token share a single window.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    rps: u32,
    jwt_secret: Arc<str>,
    windows: Arc<Mutex<HashMap<String, WindowState>>>,
}

impl RateLimiter {
    fn new(rps: u32, jwt_secret: &str) -> Self {
        Self {
            rps: rps.max(1),
            jwt_secret: Arc::from(jwt_secret),
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn caller_key(&self, req: &Request<Body>) -> String {
        req.headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .and_then(|token| decode_claims(token, &self.jwt_secret))
            .map(|claims| format!("sub:{}", claims.sub))
            .unwrap_or_else(|| ANONYMOUS.to_string())
    }

    fn allow(&self, caller: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.retain(|_, w| now.duration_since(w.start) < WINDOW);
        let window = windows.entry(caller.to_string()).or_insert(WindowState {
            start: now,
            count: 0,
        });
        if window.count < self.rps {
            window.count += 1;
            true
        } else {
            false
        }
    }
}

pub async fn rps_middleware(
    State(state): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let caller = state.caller_key(&req);
    if !state.allow(&caller, Instant::now()) {
        tracing::warn!(path = %req.uri().path(), "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "success": false, "error": "rate_limit_exceeded" })),
        )
            .into_response();
    }
    next.run(req).await
}

pub fn new_rps_state(rps: u32, jwt_secret: &str) -> RateLimiter {
    RateLimiter::new(rps, jwt_secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::Claims;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "limiter_secret";

    fn token(sub: &str, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
            role: None,
            bank_id: None,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn request_with(authorization: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/progress/save");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn callers_have_independent_windows() {
        let limiter = RateLimiter::new(2, SECRET);
        let t0 = Instant::now();
        assert!(limiter.allow("a", t0));
        assert!(limiter.allow("a", t0));
        assert!(!limiter.allow("a", t0));
        assert!(limiter.allow("b", t0));
        assert!(limiter.allow("a", t0 + WINDOW));
    }

    #[test]
    fn valid_tokens_are_keyed_by_subject() {
        let limiter = RateLimiter::new(1, SECRET);
        let alice = format!("Bearer {}", token("alice", SECRET));
        let bob = format!("Bearer {}", token("bob", SECRET));

        assert_eq!(limiter.caller_key(&request_with(Some(&alice))), "sub:alice");
        assert_eq!(limiter.caller_key(&request_with(Some(&bob))), "sub:bob");
    }

    #[test]
    fn unverified_headers_share_one_window() {
        let limiter = RateLimiter::new(1, SECRET);
        let forged = format!("Bearer {}", token("alice", "other_secret"));
        let keys: Vec<String> = [
            None,
            Some("Bearer garbage-1"),
            Some("Bearer garbage-2"),
            Some("Basic dXNlcjpwYXNz"),
            Some(forged.as_str()),
        ]
        .into_iter()
        .map(|auth| limiter.caller_key(&request_with(auth)))
        .collect();
        assert!(keys.iter().all(|k| k == ANONYMOUS));

        let t0 = Instant::now();
        assert!(limiter.allow(&keys[1], t0));
        assert!(!limiter.allow(&keys[2], t0));
    }
}
