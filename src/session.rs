//! Cookie-backed server-side sessions.
//!
//! [`CookieSession`] is both a middleware and a [`BackgroundTask`]: per request
//! it resolves (or mints) the session named by the session cookie and exposes
//! it through the [`SESSION`] extension; on its own thread it sweeps expired
//! sessions out of the shared [`SessionStore`].

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::cookie::Cookie;
use crate::dispatcher::{Handler, Request, Response};
use crate::extensions::ExtensionKey;
use crate::worker::BackgroundTask;

/// Extension under which [`CookieSession`] publishes the current session
pub static SESSION: ExtensionKey<Arc<Session>> = ExtensionKey::new("session");

/// Random bytes per session token, rendered as twice as many hex digits
pub const TOKEN_BYTES: usize = 32;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Mint attempts before giving up on finding an unused token
const MAX_TOKEN_ATTEMPTS: usize = 8;

/// One client's server-side state
#[derive(Debug)]
pub struct Session {
    token: String,
    created_at: Instant,
    max_age: Duration,
    data: RwLock<Value>,
}

impl Session {
    fn new(token: String, max_age: Duration, created_at: Instant) -> Self {
        Self {
            token,
            created_at,
            max_age,
            data: RwLock::new(Value::Null),
        }
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Expired once `now` is strictly past `created_at + max_age`
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.max_age
    }

    /// Snapshot of the whole payload
    #[must_use]
    pub fn data(&self) -> Value {
        self.data.read().clone()
    }

    pub fn set_data(&self, value: Value) {
        *self.data.write() = value;
    }

    /// Read one key of an object payload
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    /// Set one key, turning a non-object payload into an object first
    pub fn insert(&self, key: &str, value: Value) {
        let mut data = self.data.write();
        if !data.is_object() {
            *data = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(map) = &mut *data {
            map.insert(key.to_string(), value);
        }
    }

    /// Apply `f` to the payload under the write lock
    pub fn update<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        f(&mut self.data.write())
    }
}

/// Concurrent token to session map shared by request threads and the sweeper
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session under a fresh random token
    ///
    /// Tokens are inserted through the map's entry API so a collision retries
    /// with a new token instead of replacing someone else's session. Returns
    /// `None` only if every attempt collided.
    pub fn create(&self, max_age: Duration) -> Option<Arc<Session>> {
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = random_token();
            match self.sessions.entry(token) {
                Entry::Occupied(_) => {
                    warn!("Session token collision, retrying");
                }
                Entry::Vacant(slot) => {
                    let session = Arc::new(Session::new(
                        slot.key().clone(),
                        max_age,
                        Instant::now(),
                    ));
                    slot.insert(Arc::clone(&session));
                    return Some(session);
                }
            }
        }
        None
    }

    /// Look a token up, ignoring sessions that expired but were not swept yet
    #[must_use]
    pub fn get(&self, token: &str) -> Option<Arc<Session>> {
        let session = self.sessions.get(token).map(|s| Arc::clone(s.value()))?;
        (!session.is_expired(Instant::now())).then_some(session)
    }

    pub fn remove(&self, token: &str) -> Option<Arc<Session>> {
        self.sessions.remove(token).map(|(_, s)| s)
    }

    /// Drop every session expired at `now`, returning how many went
    pub fn sweep(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.sessions.retain(|_, s| {
            let keep = !s.is_expired(now);
            removed += usize::from(!keep);
            keep
        });
        removed
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.sessions.contains_key(token)
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let mut token = String::with_capacity(TOKEN_BYTES * 2);
    for b in bytes {
        token.push(char::from(HEX_DIGITS[usize::from(b >> 4)]));
        token.push(char::from(HEX_DIGITS[usize::from(b & 0x0f)]));
    }
    token
}

/// Session middleware with a periodic expiry sweep
///
/// Register it with [`App::use_worker`](crate::app::App::use_worker) so the
/// sweep starts and stops with the server.
#[derive(Debug)]
pub struct CookieSession {
    cookie_name: String,
    max_age: Duration,
    sweep_interval: Duration,
    store: Arc<SessionStore>,
}

impl CookieSession {
    pub fn new(cookie_name: impl Into<String>, max_age: Duration) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            max_age,
            sweep_interval: Duration::from_secs(60),
            store: Arc::new(SessionStore::new()),
        }
    }

    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.cookie_name.clone(),
            Duration::from_secs(config.max_age_secs),
        )
        .with_sweep_interval(Duration::from_millis(config.sweep_interval_ms))
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// `Max-Age` in whole seconds, rounded up; `0` would delete the cookie
    fn cookie_max_age(&self) -> u64 {
        u64::try_from(self.max_age.as_millis().div_ceil(1000))
            .unwrap_or(u64::MAX)
            .max(1)
    }
}

impl Handler for CookieSession {
    fn handle(&self, req: &mut Request, res: &mut Response) {
        if let Some(session) = req.cookie(&self.cookie_name).and_then(|t| self.store.get(t)) {
            req.insert_extension(&SESSION, session);
            return;
        }

        let Some(session) = self.store.create(self.max_age) else {
            warn!(request_id = %req.request_id(), "Could not mint a session token");
            return;
        };
        debug!(request_id = %req.request_id(), "Session created");
        res.set_cookie(
            &Cookie::new(self.cookie_name.as_str(), session.token())
                .max_age(self.cookie_max_age())
                .http_only(true),
        );
        req.insert_extension(&SESSION, session);
    }
}

impl BackgroundTask for CookieSession {
    fn name(&self) -> &str {
        "session-sweeper"
    }

    fn delay(&self) -> Duration {
        self.sweep_interval
    }

    fn on_update(&self) {
        let removed = self.store.sweep(Instant::now());
        if removed > 0 {
            info!(removed, remaining = self.store.len(), "Expired sessions swept");
        }
    }

    fn on_stop(&self) {
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn test_token_shape() {
        let token = random_token();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, random_token());
    }

    #[test]
    fn test_expiry_boundary() {
        let start = Instant::now();
        let s = Session::new("t".into(), Duration::from_millis(100), start);
        assert!(!s.is_expired(start + Duration::from_millis(100)));
        assert!(s.is_expired(start + Duration::from_millis(101)));
    }

    #[test]
    fn test_session_payload_helpers() {
        let store = SessionStore::new();
        let s = store.create(Duration::from_secs(60)).unwrap();
        s.insert("user", Value::from("alice"));
        assert_eq!(s.get("user"), Some(Value::from("alice")));
        let n = s.update(|v| v.as_object().map(|m| m.len()).unwrap_or(0));
        assert_eq!(n, 1);
    }

    #[test]
    fn test_middleware_reuses_known_token() {
        let mw = CookieSession::new("sid", Duration::from_secs(60));

        let mut req = Request::new(Method::GET, "/");
        let mut res = Response::new();
        mw.handle(&mut req, &mut res);
        let first = req.extension(&SESSION).cloned().unwrap();
        let set_cookie = res.header("set-cookie").unwrap().to_string();
        assert!(set_cookie.starts_with(&format!("sid={}", first.token())));
        assert!(set_cookie.contains("Max-Age=60"));
        assert!(set_cookie.contains("HttpOnly"));

        let mut req = Request::new(Method::GET, "/")
            .with_header("Cookie", format!("sid={}", first.token()));
        let mut res = Response::new();
        mw.handle(&mut req, &mut res);
        let second = req.extension(&SESSION).unwrap();
        assert!(Arc::ptr_eq(&first, second));
        assert!(res.header("set-cookie").is_none());
        assert_eq!(mw.store().len(), 1);
    }

    #[test]
    fn test_sub_second_max_age_rounds_up() {
        let mw = CookieSession::new("sid", Duration::from_millis(500));
        let mut req = Request::new(Method::GET, "/");
        let mut res = Response::new();
        mw.handle(&mut req, &mut res);
        let set_cookie = res.header("set-cookie").unwrap();
        assert!(set_cookie.contains("Max-Age=1"), "{set_cookie}");

        let mw = CookieSession::new("sid", Duration::from_millis(1500));
        assert_eq!(mw.cookie_max_age(), 2);
        let mw = CookieSession::new("sid", Duration::ZERO);
        assert_eq!(mw.cookie_max_age(), 1);
    }

    #[test]
    fn test_unknown_token_gets_new_session() {
        let mw = CookieSession::new("sid", Duration::from_secs(60));
        let mut req = Request::new(Method::GET, "/").with_header("Cookie", "sid=forged");
        let mut res = Response::new();
        mw.handle(&mut req, &mut res);
        let session = req.extension(&SESSION).unwrap();
        assert_ne!(session.token(), "forged");
        assert!(res.header("set-cookie").is_some());
    }

    #[test]
    fn test_on_stop_clears_store() {
        let mw = CookieSession::new("sid", Duration::from_secs(60));
        mw.store().create(Duration::from_secs(60));
        mw.on_stop();
        assert!(mw.store().is_empty());
    }
}
