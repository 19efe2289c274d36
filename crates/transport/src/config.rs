//! Client configuration and the single environment lookup.
//!
//! Components never read the process environment themselves. The outermost
//! caller builds a [`Settings`] once, via [`Settings::from_env`], and passes
//! the resulting [`ClientConfig`] and [`PollerConfig`] into constructors.

use std::fmt;
use std::time::Duration;

use convergence::PollerConfig;
use thiserror::Error;

/// API endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "https://app.datarobot.com/api/v2";

/// `User-Agent` sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("mlops-convergence/", env!("CARGO_PKG_VERSION"));

/// Environment variable holding the API endpoint.
pub const ENDPOINT_ENV: &str = "DATAROBOT_ENDPOINT";
/// Environment variable holding the bearer credential.
pub const API_KEY_ENV: &str = "DATAROBOT_API_KEY";
/// Environment variable holding the consumer trace context.
pub const TRACE_CONTEXT_ENV: &str = "DATAROBOT_TRACE_CONTEXT";
/// Environment variable overriding the readiness-poll budget, in minutes.
pub const TIMEOUT_MINUTES_ENV: &str = "DATAROBOT_TIMEOUT_MINUTES";
/// Setting this to `1` enables diagnostic echo of API calls.
pub const TRACE_API_CALLS_ENV: &str = "TRACE_API_CALLS";
/// Log-level variables of the host tool; `DEBUG` or `TRACE` enables diagnostic echo.
pub const LOG_LEVEL_ENVS: [&str; 2] = ["TF_LOG", "TF_LOG_PROVIDER"];

/// Invalid or missing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No credential was supplied.
    #[error("API key is missing; set DATAROBOT_API_KEY")]
    MissingApiKey,

    /// The endpoint is not an absolute URL.
    #[error("invalid API endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),
}

/// Connection settings for a [`crate::Client`].
///
/// Immutable once the client is built; the client shares it behind an `Arc`.
#[derive(Clone)]
pub struct ClientConfig {
    pub(crate) endpoint: String,
    pub(crate) token: String,
    pub(crate) user_agent: String,
    pub(crate) trace_context: Option<String>,
    pub(crate) debug: bool,
    pub(crate) request_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Creates a configuration for `endpoint` authenticated with `token`.
    ///
    /// Trailing slashes on the endpoint are removed so that API paths, which
    /// start with `/`, can be appended directly.
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            endpoint,
            token: token.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            trace_context: None,
            debug: false,
            request_timeout: None,
        }
    }

    /// Overrides the `User-Agent` header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the consumer trace context header. Empty values are ignored.
    pub fn with_trace_context(mut self, trace_context: impl Into<String>) -> Self {
        let trace_context = trace_context.into();
        self.trace_context = (!trace_context.is_empty()).then_some(trace_context);
        self
    }

    /// Enables diagnostic echo of every call.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Bounds every individual request.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// The base endpoint, without a trailing slash.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether diagnostic echo is enabled.
    pub fn debug(&self) -> bool {
        self.debug
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("trace_context", &self.trace_context.as_ref().map(|_| "<redacted>"))
            .field("debug", &self.debug)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Everything the composition root reads from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Transport settings.
    pub client: ClientConfig,
    /// Readiness-poll schedule and budget.
    pub poller: PollerConfig,
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup(API_KEY_ENV)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        let endpoint = lookup(ENDPOINT_ENV)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let debug = lookup(TRACE_API_CALLS_ENV).is_some_and(|v| v == "1")
            || LOG_LEVEL_ENVS
                .iter()
                .filter_map(|key| lookup(key))
                .any(|level| level == "DEBUG" || level == "TRACE");

        let mut client = ClientConfig::new(endpoint, token).with_debug(debug);
        if let Some(trace_context) = lookup(TRACE_CONTEXT_ENV) {
            client = client.with_trace_context(trace_context);
        }

        // Unparseable values fall back to the default budget, like non-positive ones.
        let minutes = lookup(TIMEOUT_MINUTES_ENV)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(0);

        Ok(Self {
            client,
            poller: PollerConfig::from_timeout_minutes(minutes),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(
            ClientConfig::new("https://example.test/api/v2/", "t").endpoint(),
            "https://example.test/api/v2"
        );
    }

    #[test]
    fn debug_output_redacts_token() {
        let rendered = format!("{:?}", ClientConfig::new(DEFAULT_ENDPOINT, "secret-token"));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn missing_api_key_is_rejected() {
        assert!(matches!(
            Settings::from_lookup(lookup(&[])),
            Err(ConfigError::MissingApiKey)
        ));
        assert!(matches!(
            Settings::from_lookup(lookup(&[(API_KEY_ENV, "")])),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let settings = Settings::from_lookup(lookup(&[(API_KEY_ENV, "k")])).unwrap();
        assert_eq!(settings.client.endpoint(), DEFAULT_ENDPOINT);
        assert!(!settings.client.debug());
        assert_eq!(settings.poller, PollerConfig::default());
    }

    #[test]
    fn timeout_minutes_override_and_fallbacks() {
        let with = |v: &str| {
            Settings::from_lookup(lookup(&[(API_KEY_ENV, "k"), (TIMEOUT_MINUTES_ENV, v)]))
                .unwrap()
                .poller
                .timeout
        };
        assert_eq!(with("45"), Duration::from_secs(45 * 60));
        assert_eq!(with("0"), Duration::from_secs(30 * 60));
        assert_eq!(with("-3"), Duration::from_secs(30 * 60));
        assert_eq!(with("soon"), Duration::from_secs(30 * 60));
    }

    #[test]
    fn debug_flag_sources() {
        let debug = |vars: &[(&str, &str)]| {
            let mut all = vec![(API_KEY_ENV, "k")];
            all.extend_from_slice(vars);
            Settings::from_lookup(lookup(&all)).unwrap().client.debug()
        };
        assert!(debug(&[(TRACE_API_CALLS_ENV, "1")]));
        assert!(debug(&[("TF_LOG", "TRACE")]));
        assert!(debug(&[("TF_LOG_PROVIDER", "DEBUG")]));
        assert!(!debug(&[("TF_LOG", "INFO")]));
        assert!(!debug(&[(TRACE_API_CALLS_ENV, "0")]));
    }

    #[test]
    fn empty_trace_context_is_ignored() {
        let settings =
            Settings::from_lookup(lookup(&[(API_KEY_ENV, "k"), (TRACE_CONTEXT_ENV, "")])).unwrap();
        assert!(settings.client.trace_context.is_none());
    }
}
