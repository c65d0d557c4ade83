/// Default user agent sent with every Reddit API request.
pub const DEFAULT_USER_AGENT: &str = "ereddicator";

/// Token endpoint host for script-app password grants.
pub const REDDIT_AUTH_URL: &str = "https://www.reddit.com";

/// Host for authenticated API calls.
pub const REDDIT_API_URL: &str = "https://oauth.reddit.com";

/// Largest listing page Reddit will return.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Per-request HTTP timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;
