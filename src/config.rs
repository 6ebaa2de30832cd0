//! Client configuration from the environment

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_USER_ID: &str = "test-user";
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_id: String,
    /// History page size
    pub page_size: usize,
    /// Cancels an answer that runs longer than this. The stream client
    /// itself never times out.
    pub answer_timeout: Option<Duration>,
    /// Applies to REST calls only
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            answer_timeout: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let page_size = match get("LAWCHAT_PAGE_SIZE") {
            Some(raw) => parse_positive("LAWCHAT_PAGE_SIZE", &raw)?,
            None => defaults.page_size,
        };
        // 0 disables the timeout
        let answer_timeout = match get("LAWCHAT_ANSWER_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    return Err(ConfigError::Invalid {
                        var: "LAWCHAT_ANSWER_TIMEOUT_SECS",
                        value: raw,
                    });
                }
            },
            None => defaults.answer_timeout,
        };
        let request_timeout = match get("LAWCHAT_REQUEST_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_positive::<u64>("LAWCHAT_REQUEST_TIMEOUT_SECS", &raw)?),
            None => defaults.request_timeout,
        };

        Ok(Self {
            base_url: get("LAWCHAT_BASE_URL")
                .map_or(defaults.base_url, |url| url.trim_end_matches('/').to_string()),
            user_id: get("LAWCHAT_USER_ID").unwrap_or(defaults.user_id),
            page_size,
            answer_timeout,
            request_timeout,
        })
    }
}

fn parse_positive<N>(var: &'static str, raw: &str) -> Result<N, ConfigError>
where
    N: FromStr + PartialOrd + Default,
{
    match raw.trim().parse::<N>() {
        Ok(n) if n > N::default() => Ok(n),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
        }),
    }
}
