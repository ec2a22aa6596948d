use crate::api::Error;
use crate::auth::Credentials;
use crate::retry::RetryPolicy;
use config::Config;
use std::fmt;
use std::time::Duration;

pub const API_URL: &str = "http://application.izypowercloud.fr/photo_voltaic";
/// Prefix of the environment variables read by [`Settings::load`], e.g. `IZY_USERNAME`.
pub const ENV_PREFIX: &str = "IZY";
/// Optional settings file (`izypower.toml`, `izypower.json`, ...) in the working directory.
pub const CONFIG_FILE: &str = "izypower";

const DEFAULT_REFRESH_MINUTES: u64 = 3;
const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_MS: u64 = 1000;
const DEFAULT_RETRY_MAX_MS: u64 = 30_000;
const DEFAULT_RETRY_JITTER_MS: u64 = 500;

#[derive(Clone, serde::Deserialize)]
pub struct Settings {
    pub api_url: String,
    pub username: String,
    pub password: String,
    /// Minutes between two scheduled refreshes.
    pub refresh_period: u64,
    pub language: String,
    /// Seconds.
    pub request_timeout: u64,
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub retry_jitter_ms: u64,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("refresh_period", &self.refresh_period)
            .field("language", &self.language)
            .field("request_timeout", &self.request_timeout)
            .field("retry_attempts", &self.retry_attempts)
            .finish()
    }
}

impl Settings {
    /// Settings with every default and the given account.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            api_url: String::from(API_URL),
            username: username.into(),
            password: password.into(),
            refresh_period: DEFAULT_REFRESH_MINUTES,
            language: String::from(DEFAULT_LANGUAGE),
            request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
            retry_max_ms: DEFAULT_RETRY_MAX_MS,
            retry_jitter_ms: DEFAULT_RETRY_JITTER_MS,
        }
    }

    /// Read settings from defaults, the optional settings file and `IZY_*`
    /// environment variables, later sources overriding earlier ones.
    pub fn load() -> Result<Self, Error> {
        let mut settings = Config::default();
        settings
            .set_default("api_url", API_URL)?
            .set_default("refresh_period", DEFAULT_REFRESH_MINUTES as i64)?
            .set_default("language", DEFAULT_LANGUAGE)?
            .set_default("request_timeout", DEFAULT_REQUEST_TIMEOUT_SECS as i64)?
            .set_default("retry_attempts", DEFAULT_RETRY_ATTEMPTS as i64)?
            .set_default("retry_base_ms", DEFAULT_RETRY_BASE_MS as i64)?
            .set_default("retry_max_ms", DEFAULT_RETRY_MAX_MS as i64)?
            .set_default("retry_jitter_ms", DEFAULT_RETRY_JITTER_MS as i64)?;
        settings
            .merge(config::File::with_name(CONFIG_FILE).required(false))?
            .merge(config::Environment::with_prefix(ENV_PREFIX))?;

        let settings: Settings = settings.try_into()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.username.trim().is_empty() {
            return Err(Error::Configuration(String::from("username must not be empty")));
        }
        if self.password.is_empty() {
            return Err(Error::Configuration(String::from("password must not be empty")));
        }
        if self.refresh_period == 0 {
            return Err(Error::Configuration(String::from(
                "refresh_period must be at least one minute",
            )));
        }
        if self.retry_attempts == 0 {
            return Err(Error::Configuration(String::from(
                "retry_attempts must be at least 1",
            )));
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(Error::Configuration(format!(
                "api_url is not an http(s) URL: {}",
                self.api_url
            )));
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_period * 60)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_ms),
            max_delay: Duration::from_millis(self.retry_max_ms),
            max_jitter: Duration::from_millis(self.retry_jitter_ms),
        }
    }
}
