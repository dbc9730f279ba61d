use crate::error::{Result, ScorecardError};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_REFETCH_MS: u64 = 500;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// What the sync engine does with an optimistic value whose persist failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Restore the previous value if nothing newer has overwritten it.
    #[default]
    Revert,
    /// Leave the optimistic value in place until the next refetch.
    Keep,
}

impl FromStr for FailurePolicy {
    type Err = ScorecardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "revert" => Ok(FailurePolicy::Revert),
            "keep" => Ok(FailurePolicy::Keep),
            other => Err(ScorecardError::Config(format!(
                "unknown failure policy '{}', expected revert or keep",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub api_base_url: String,
    pub token: Option<String>,
    pub refetch_debounce: Duration,
    pub request_timeout: Duration,
    pub on_failure: FailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base_url: DEFAULT_API_URL.to_string(),
            token: None,
            refetch_debounce: Duration::from_millis(DEFAULT_REFETCH_MS),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            on_failure: FailurePolicy::default(),
        }
    }
}

impl Config {
    /// Reads `SCORECARD_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset or blank keys keep defaults.
    ///
    /// # Arguments
    /// * `lookup` - Returns the raw value for a variable name, if set
    ///
    /// # Returns
    /// * `Ok(Config)` - Defaults overlaid with the values found
    /// * `Err(ScorecardError::Config)` - A value is present but malformed
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(url) = get("SCORECARD_API_URL") {
            config.api_base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(token) = get("SCORECARD_TOKEN") {
            config.token = Some(token.trim().to_string());
        }
        if let Some(ms) = get("SCORECARD_REFETCH_MS") {
            config.refetch_debounce = Duration::from_millis(parse_number("SCORECARD_REFETCH_MS", &ms)?);
        }
        if let Some(secs) = get("SCORECARD_TIMEOUT_SECS") {
            config.request_timeout =
                Duration::from_secs(parse_number("SCORECARD_TIMEOUT_SECS", &secs)?);
        }
        if let Some(policy) = get("SCORECARD_ON_FAILURE") {
            config.on_failure = policy.parse()?;
        }

        Ok(config)
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| ScorecardError::Config(format!("{} must be a whole number, got '{}'", key, raw)))
}
