use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{DEFAULT_USER_AGENT, MAX_PAGE_SIZE, REDDIT_API_URL, REDDIT_AUTH_URL};
use crate::scrubber::{ExclusionConfig, LengthBounds, RetryPolicy, TextConstraints};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

const CREDENTIALS_HELP: &str = "\
Reddit credentials are read from the environment or a .env file:
  REDDIT_CLIENT_ID=<script app id>
  REDDIT_CLIENT_SECRET=<script app secret>
  REDDIT_USERNAME=<account name>
  REDDIT_PASSWORD=<account password>
  REDDIT_TWO_FACTOR_CODE=<current 2FA code, only if enabled>";

impl ConfigError {
    /// Setup instructions to show alongside the error, if any apply.
    #[must_use]
    pub fn help(&self) -> Option<&'static str> {
        match self {
            Self::MissingEnvVar(name) if name.starts_with("REDDIT_") => Some(CREDENTIALS_HELP),
            _ => None,
        }
    }
}

/// Script-app credentials for the Reddit account being scrubbed.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub two_factor_code: Option<String>,
}

impl RedditCredentials {
    /// Password as sent to the token endpoint.
    ///
    /// Reddit expects a two-factor code appended as `password:123456`.
    #[must_use]
    pub fn login_password(&self) -> String {
        match self.two_factor_code.as_deref() {
            Some(code) => format!("{}:{code}", self.password),
            None => self.password.clone(),
        }
    }
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("two_factor", &self.two_factor_code.is_some())
            .finish_non_exhaustive()
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Reddit
    pub credentials: RedditCredentials,
    pub user_agent: String,
    pub reddit_auth_url: String,
    pub reddit_api_url: String,

    // Run state
    pub database_path: PathBuf,

    // Selection
    pub include_posts: bool,
    pub include_comments: bool,
    pub preserve_ids: Vec<String>,
    pub preserve_subreddits: Vec<String>,
    pub only_subreddits: Vec<String>,
    pub min_age: chrono::Duration,
    pub max_age: Option<chrono::Duration>,

    // Mutation
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub worker_concurrency: usize,
    pub rate_limit_per_min: u32,
    pub page_size: u32,
    pub dry_run: bool,

    // Replacement text
    pub random_seed: Option<u64>,
    pub comment_length: LengthBounds,
    pub post_length: LengthBounds,
    pub banned_patterns: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Reddit
            credentials: RedditCredentials {
                client_id: required_env("REDDIT_CLIENT_ID")?,
                client_secret: required_env("REDDIT_CLIENT_SECRET")?,
                username: required_env("REDDIT_USERNAME")?,
                password: required_env("REDDIT_PASSWORD")?,
                two_factor_code: optional_env("REDDIT_TWO_FACTOR_CODE")
                    .and_then(|code| normalize_two_factor_code(&code)),
            },
            user_agent: env_or_default("REDDIT_USER_AGENT", DEFAULT_USER_AGENT),
            reddit_auth_url: env_or_default("REDDIT_AUTH_URL", REDDIT_AUTH_URL),
            reddit_api_url: env_or_default("REDDIT_API_URL", REDDIT_API_URL),

            // Run state
            database_path: PathBuf::from(env_or_default(
                "DATABASE_PATH",
                "./data/ereddicator.sqlite",
            )),

            // Selection
            include_posts: parse_env_bool("INCLUDE_POSTS", true)?,
            include_comments: parse_env_bool("INCLUDE_COMMENTS", true)?,
            preserve_ids: parse_env_list("PRESERVE_IDS"),
            preserve_subreddits: parse_env_list("PRESERVE_SUBREDDITS"),
            only_subreddits: parse_env_list("ONLY_SUBREDDITS"),
            min_age: parse_env_hours("MIN_AGE_HOURS")?.unwrap_or_else(chrono::Duration::zero),
            max_age: parse_env_hours("MAX_AGE_HOURS")?,

            // Mutation
            max_attempts: parse_env_u32("MAX_ATTEMPTS", 3)?,
            retry_base_delay: Duration::from_millis(parse_env_u64("RETRY_BASE_DELAY_MS", 1000)?),
            retry_max_delay: Duration::from_millis(parse_env_u64("RETRY_MAX_DELAY_MS", 30_000)?),
            worker_concurrency: parse_env_usize("WORKER_CONCURRENCY", 2)?,
            rate_limit_per_min: parse_env_u32("RATE_LIMIT_PER_MIN", 60)?,
            page_size: parse_env_u32("PAGE_SIZE", MAX_PAGE_SIZE)?,
            dry_run: parse_env_bool("DRY_RUN", false)?,

            // Replacement text
            random_seed: parse_env_optional_u64("RANDOM_SEED")?,
            comment_length: LengthBounds {
                min: parse_env_usize("COMMENT_MIN_LEN", 5)?,
                max: parse_env_usize("COMMENT_MAX_LEN", 200)?,
            },
            post_length: LengthBounds {
                min: parse_env_usize("POST_MIN_LEN", 5)?,
                max: parse_env_usize("POST_MAX_LEN", 200)?,
            },
            banned_patterns: parse_env_list("BANNED_PATTERNS"),
        })
    }

    /// Configuration with placeholder credentials and fast retries, for tests.
    #[doc(hidden)]
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            credentials: RedditCredentials {
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
                username: "test_user".to_string(),
                password: "hunter2".to_string(),
                two_factor_code: None,
            },
            user_agent: DEFAULT_USER_AGENT.to_string(),
            reddit_auth_url: REDDIT_AUTH_URL.to_string(),
            reddit_api_url: REDDIT_API_URL.to_string(),
            database_path: PathBuf::from("./data/test.sqlite"),
            include_posts: true,
            include_comments: true,
            preserve_ids: Vec::new(),
            preserve_subreddits: Vec::new(),
            only_subreddits: Vec::new(),
            min_age: chrono::Duration::zero(),
            max_age: None,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(5),
            worker_concurrency: 2,
            rate_limit_per_min: 60_000,
            page_size: MAX_PAGE_SIZE,
            dry_run: false,
            random_seed: Some(7),
            comment_length: LengthBounds { min: 5, max: 200 },
            post_length: LengthBounds { min: 5, max: 200 },
            banned_patterns: Vec::new(),
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("REDDIT_CLIENT_ID", &self.credentials.client_id),
            ("REDDIT_CLIENT_SECRET", &self.credentials.client_secret),
            ("REDDIT_USERNAME", &self.credentials.username),
            ("REDDIT_PASSWORD", &self.credentials.password),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(name, "cannot be empty"));
            }
        }
        for (name, value) in [
            ("REDDIT_AUTH_URL", &self.reddit_auth_url),
            ("REDDIT_API_URL", &self.reddit_api_url),
        ] {
            url::Url::parse(value).map_err(|e| invalid(name, &format!("not a valid URL: {e}")))?;
        }
        if self.worker_concurrency == 0 {
            return Err(invalid("WORKER_CONCURRENCY", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("MAX_ATTEMPTS", "must be at least 1"));
        }
        if self.rate_limit_per_min == 0 {
            return Err(invalid("RATE_LIMIT_PER_MIN", "must be at least 1"));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(invalid(
                "PAGE_SIZE",
                &format!("must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }
        if self.retry_max_delay < self.retry_base_delay {
            return Err(invalid(
                "RETRY_MAX_DELAY_MS",
                "must not be smaller than RETRY_BASE_DELAY_MS",
            ));
        }
        if let Some(max_age) = self.max_age {
            if max_age < self.min_age {
                return Err(invalid("MAX_AGE_HOURS", "must not be smaller than MIN_AGE_HOURS"));
            }
        }
        validate_bounds("COMMENT", self.comment_length)?;
        validate_bounds("POST", self.post_length)?;
        for pattern in &self.banned_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(invalid("BANNED_PATTERNS", &format!("'{pattern}': {e}")));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn exclusion_config(&self) -> ExclusionConfig {
        ExclusionConfig::new(
            &self.preserve_ids,
            &self.preserve_subreddits,
            &self.only_subreddits,
            self.min_age,
            self.max_age,
            self.include_posts,
            self.include_comments,
        )
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
        }
    }

    #[must_use]
    pub fn text_constraints(&self) -> TextConstraints {
        TextConstraints {
            comment: self.comment_length,
            post: self.post_length,
            banned_patterns: self.banned_patterns.clone(),
        }
    }
}

fn invalid(name: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message: message.to_string(),
    }
}

fn validate_bounds(prefix: &str, bounds: LengthBounds) -> Result<(), ConfigError> {
    if bounds.min == 0 {
        return Err(invalid(&format!("{prefix}_MIN_LEN"), "must be at least 1"));
    }
    if bounds.max < bounds.min {
        return Err(invalid(
            &format!("{prefix}_MAX_LEN"),
            &format!("must not be smaller than {prefix}_MIN_LEN"),
        ));
    }
    Ok(())
}

/// Strip spaces from a two-factor code; "None" (any case) means no code.
fn normalize_two_factor_code(raw: &str) -> Option<String> {
    let code: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if code.is_empty() || code.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(code)
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_list(name: &str) -> Vec<String> {
    optional_env(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    Ok(parse_env_optional_u64(name)?.unwrap_or(default))
}

fn parse_env_optional_u64(name: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => {
            val.trim()
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::ParseInt {
                    name: name.to_string(),
                    source: e,
                })
        }
        _ => Ok(None),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.trim().parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.trim().parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_hours(name: &str) -> Result<Option<chrono::Duration>, ConfigError> {
    let Some(hours) = parse_env_optional_u64(name)? else {
        return Ok(None);
    };
    i64::try_from(hours)
        .ok()
        .and_then(chrono::Duration::try_hours)
        .map(Some)
        .ok_or_else(|| invalid(name, "too large"))
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}
