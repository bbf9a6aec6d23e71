use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::BrokerErrorKind;
use crate::http_client::{HttpClient, HttpRequest};
use crate::retry::RetryConfig;
use crate::BrokerError;

const TOKEN_PATH: &str = "/oauth2/tokenP";

/// Business code the token endpoint returns while throttling an app key.
pub const TOKEN_RATE_LIMIT_CODE: &str = "EGW00133";

/// Business code returned by data endpoints once a token has expired.
pub const TOKEN_EXPIRED_CODE: &str = "EGW00123";

/// Tokens are refreshed this long before their reported expiry.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// Application credentials and the account they trade in.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub app_key: String,
    pub app_secret: String,
    /// Eight-digit account number (`CANO`).
    pub account_number: String,
    /// Two-digit account product code (`ACNT_PRDT_CD`).
    pub account_product_code: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_key", &"<redacted>")
            .field("app_secret", &"<redacted>")
            .field("account_number", &mask(&self.account_number))
            .field("account_product_code", &self.account_product_code)
            .finish()
    }
}

fn mask(value: &str) -> String {
    let tail = value.len().saturating_sub(2);
    format!("***{}", value.get(tail..).unwrap_or_default())
}

/// Access token plus the monotonic instant it expires at.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    access_token: String,
    expires_at: Duration,
}

impl AuthSession {
    pub fn new(access_token: impl Into<String>, expires_at: Duration) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub const fn expires_at(&self) -> Duration {
        self.expires_at
    }

    /// `now >= expires_at - margin`.
    pub fn needs_refresh(&self, now: Duration, margin: Duration) -> bool {
        now.saturating_add(margin) >= self.expires_at
    }
}

impl Debug for AuthSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    access_token: String,
    expires_in: TokenLifetime,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenLifetime {
    Seconds(u64),
    Text(String),
}

impl TokenLifetime {
    fn seconds(&self) -> Option<u64> {
        match self {
            Self::Seconds(value) => Some(*value),
            Self::Text(value) => value.trim().parse().ok(),
        }
    }
}

/// Lazily issues and caches the bearer token for one application key.
///
/// The cached session sits behind an async mutex that stays locked while a
/// refresh is in flight, so concurrent callers never trigger a second
/// refresh for the same expiry.
pub struct TokenManager {
    base_url: String,
    credentials: Arc<Credentials>,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    safety_margin: Duration,
    session: Mutex<Option<AuthSession>>,
}

impl TokenManager {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<Credentials>,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            http,
            clock,
            retry: RetryConfig::token_rate_limit(),
            safety_margin: DEFAULT_SAFETY_MARGIN,
            session: Mutex::new(None),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_safety_margin(mut self, safety_margin: Duration) -> Self {
        self.safety_margin = safety_margin;
        self
    }

    /// Current token, refreshing first when it is missing or about to expire.
    pub async fn access_token(&self) -> Result<String, BrokerError> {
        let mut session = self.session.lock().await;
        let now = self.clock.monotonic();

        if let Some(current) = session.as_ref() {
            if !current.needs_refresh(now, self.safety_margin) {
                return Ok(current.access_token.clone());
            }
        }

        let fresh = self.issue().await?;
        let token = fresh.access_token.clone();
        *session = Some(fresh);
        Ok(token)
    }

    /// Drop the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        if self.session.lock().await.take().is_some() {
            warn!("access token rejected as expired; cached token dropped");
        }
    }

    pub async fn session(&self) -> Option<AuthSession> {
        self.session.lock().await.clone()
    }

    async fn issue(&self) -> Result<AuthSession, BrokerError> {
        let mut attempt = 0;
        loop {
            match self.request_token().await {
                Err(error) if error.kind() == BrokerErrorKind::AuthRateLimited => {
                    let Some(delay) = self.retry.delay_for_attempt(attempt) else {
                        return Err(BrokerError::auth(format!(
                            "token endpoint still throttling after {attempt} retries: {}",
                            error.message()
                        )));
                    };
                    warn!(
                        wait_secs = delay.as_secs(),
                        "token endpoint rate limited; waiting before retry"
                    );
                    self.clock.sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn request_token(&self) -> Result<AuthSession, BrokerError> {
        let body = json!({
            "grant_type": "client_credentials",
            "appkey": self.credentials.app_key,
            "appsecret": self.credentials.app_secret,
        });
        let request = HttpRequest::post(format!("{}{TOKEN_PATH}", self.base_url)).with_json(&body);

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|error| BrokerError::auth(format!("token request failed: {}", error.message())))?;

        if response.status == 403 && response.body.contains(TOKEN_RATE_LIMIT_CODE) {
            return Err(BrokerError::auth_rate_limited(format!(
                "token endpoint returned {TOKEN_RATE_LIMIT_CODE}"
            )));
        }
        if !response.is_success() {
            let snippet: String = response.body.chars().take(200).collect();
            return Err(BrokerError::auth(format!(
                "token endpoint returned status {}: {snippet}",
                response.status
            )));
        }

        let payload: TokenPayload = serde_json::from_str(&response.body)
            .map_err(|error| BrokerError::auth(format!("token payload is malformed: {error}")))?;
        let lifetime = payload
            .expires_in
            .seconds()
            .ok_or_else(|| BrokerError::auth("token payload has an unreadable expires_in"))?;

        info!(expires_in_secs = lifetime, "access token issued");
        Ok(AuthSession::new(
            payload.access_token,
            self.clock.monotonic() + Duration::from_secs(lifetime),
        ))
    }
}
