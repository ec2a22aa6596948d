use crate::api::response::login::Login;
use crate::api::{self, endpoint, Error};
use crate::retry::{self, RetryPolicy};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Lifetime assumed for tokens whose expiry cannot be decoded.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 600;
/// Tokens are renewed this long before they actually expire.
const EXPIRY_SKEW_SECS: i64 = 10;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Clone)]
pub struct SessionToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl SessionToken {
    /// Expiry comes from the JWT `exp` claim when the token carries one.
    pub fn issued(value: String, now: DateTime<Utc>) -> Self {
        let expires_at = jwt_expiry(&value)
            .unwrap_or_else(|| now + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));
        Self { value, expires_at }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - Duration::seconds(EXPIRY_SKEW_SECS)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Read the `exp` claim of a JWT without verifying it.
fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| log::debug!("failed decoding JWT payload: {}", e))
        .ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp").and_then(Value::as_f64)?;
    DateTime::<Utc>::from_timestamp(exp as i64, 0)
}

/// `fr` for French installations, `en` for everything else.
pub fn accept_language(language: &str) -> &'static str {
    if language.to_lowercase().starts_with("fr") {
        "fr"
    } else {
        "en"
    }
}

/// Owns the credentials and the current session token.
///
/// Readers share the token through a read lock; logins are serialized
/// through `login_gate` so that concurrent callers finding no valid token
/// trigger a single login exchange.
pub struct TokenManager {
    http: reqwest::Client,
    login_url: String,
    language: &'static str,
    retry: RetryPolicy,
    credentials: RwLock<Credentials>,
    token: RwLock<Option<SessionToken>>,
    login_gate: Mutex<()>,
    logins: AtomicU64,
}

impl TokenManager {
    pub fn new(
        http: reqwest::Client,
        api_url: &str,
        credentials: Credentials,
        language: &str,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            login_url: format!("{}{}", api_url, endpoint::LOGIN),
            language: accept_language(language),
            retry,
            credentials: RwLock::new(credentials),
            token: RwLock::new(None),
            login_gate: Mutex::new(()),
            logins: AtomicU64::new(0),
        }
    }

    async fn current(&self) -> Option<String> {
        self.token
            .read()
            .await
            .as_ref()
            .filter(|token| token.is_valid_at(Utc::now()))
            .map(|token| token.value.clone())
    }

    /// Return a token usable for the next call, logging in first when there
    /// is none or the current one expired.
    pub async fn valid_token(&self, cancel: &CancellationToken) -> Result<String, Error> {
        if let Some(token) = self.current().await {
            return Ok(token);
        }

        let _gate = self.login_gate.lock().await;
        /* another caller may have logged in while we waited */
        if let Some(token) = self.current().await {
            return Ok(token);
        }

        let token = retry::retry(&self.retry, cancel, Error::is_transient, || self.login()).await?;
        log::debug!("obtained token, expires at {}", token.expires_at);
        let value = token.value.clone();
        *self.token.write().await = Some(token);
        Ok(value)
    }

    /// Drop `rejected` so the next [`valid_token`](Self::valid_token) logs in.
    ///
    /// Only clears the cell while it still holds the rejected token; a token
    /// refreshed in the meantime by a concurrent caller is kept.
    pub async fn invalidate(&self, rejected: &str) {
        let mut token = self.token.write().await;
        if token.as_ref().map_or(false, |t| t.value == rejected) {
            log::info!("access token rejected, will log in again");
            *token = None;
        }
    }

    /// Swap credentials wholesale (reauthentication) and forget the session.
    pub async fn replace_credentials(&self, credentials: Credentials) {
        let _gate = self.login_gate.lock().await;
        *self.credentials.write().await = credentials;
        *self.token.write().await = None;
    }

    /// Number of login exchanges performed so far.
    pub fn login_count(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    /// Perform one credentials → token exchange.
    pub async fn login(&self) -> Result<SessionToken, Error> {
        let credentials = self.credentials.read().await.clone();
        self.logins.fetch_add(1, Ordering::Relaxed);
        log::debug!("logging in as {}", credentials.username);

        let body = serde_json::json!({
            "username": credentials.username,
            "password": credentials.password,
        });

        let response = self
            .http
            .post(&self.login_url)
            .header(reqwest::header::ACCEPT_LANGUAGE, self.language)
            .header(endpoint::APP_PLATFORM_HEADER, endpoint::APP_PLATFORM)
            .json(&body)
            .send()
            .await
            .map_err(api::map_transport_err)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(api::map_transport_err)?;
        log::debug!("login response (status {})", status);

        if status == http::StatusCode::UNAUTHORIZED || status == http::StatusCode::FORBIDDEN {
            return Err(Error::Authentication(format!(
                "credentials rejected (HTTP {})",
                status.as_u16()
            )));
        }
        api::check_status(status, &text)?;

        let login: Login = serde_json::from_str(&text)
            .map_err(|e| Error::InvalidResponse(text.clone(), e.to_string()))?;

        match login.data.and_then(|data| data.token) {
            Some(token) if !token.is_empty() => Ok(SessionToken::issued(token, Utc::now())),
            _ => Err(Error::Authentication(
                login
                    .msg
                    .unwrap_or_else(|| String::from("login returned no token")),
            )),
        }
    }
}
