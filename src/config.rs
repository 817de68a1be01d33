use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use anyhow::{Context, Result};

/// Which backend holds session and requirement records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Shared Redis instance.
    Redis,
    /// Process-local maps. Only useful for a single instance or tests.
    Memory,
}

/// What to do when the usage meter cannot report a figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UsageFailurePolicy {
    /// Treat the subscriber as over quota.
    #[default]
    Closed,
    /// Treat the subscriber as having used nothing.
    Open,
}

impl UsageFailurePolicy {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "closed" | "fail_closed" => Ok(Self::Closed),
            "open" | "fail_open" => Ok(Self::Open),
            other => anyhow::bail!("unknown usage failure policy: {other}"),
        }
    }
}

/// The application's configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The address the HTTP server binds to.
    pub listen_addr: SocketAddr,
    /// The store backend.
    pub store: StoreBackend,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// Upper bound for a single store call.
    pub store_timeout: Duration,
    /// Override for the `create_href` advertised by discovery.
    pub create_session_url: Option<String>,
    /// Override for the `browse_href` advertised by discovery.
    pub browse_url: Option<String>,
    /// Override for the terms page URL used in `view_page` requirements.
    pub terms_url: Option<String>,
    /// Override for the login page URL used in `provide_credentials` requirements.
    pub login_url: Option<String>,
    /// Lifetime of a freshly created session.
    pub session_ttl: Duration,
    /// Byte quota for a freshly created session. 0 means unlimited.
    pub session_data_limit: u64,
    /// Fallback when the usage meter fails.
    pub usage_failure_policy: UsageFailurePolicy,
    /// Directory served as the legacy portal's static fallback.
    pub static_dir: String,
    /// Session creations allowed per second per client IP. 0 disables the limit.
    pub rate_limit_per_second: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            store: StoreBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            store_timeout: Duration::from_millis(2000),
            create_session_url: None,
            browse_url: None,
            terms_url: None,
            login_url: None,
            session_ttl: Duration::from_secs(3600),
            session_data_limit: 10_000_000,
            usage_failure_policy: UsageFailurePolicy::Closed,
            static_dir: "static".to_string(),
            rate_limit_per_second: 0,
        }
    }
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a `Config` from an arbitrary key lookup. Unset or blank keys fall
    /// back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let listen_addr = match get("CAPPORT_LISTEN_ADDR") {
            Some(v) => v.parse().context("Invalid CAPPORT_LISTEN_ADDR")?,
            None => defaults.listen_addr,
        };

        let store = match get("CAPPORT_STORE").as_deref().map(str::trim) {
            None | Some("redis") => StoreBackend::Redis,
            Some("memory") => StoreBackend::Memory,
            Some(other) => anyhow::bail!("CAPPORT_STORE must be 'redis' or 'memory', got '{other}'"),
        };

        let store_timeout = match get("CAPPORT_STORE_TIMEOUT_MS") {
            Some(v) => Duration::from_millis(
                v.parse().context("Invalid CAPPORT_STORE_TIMEOUT_MS")?,
            ),
            None => defaults.store_timeout,
        };

        let session_ttl = match get("CAPPORT_SESSION_TTL_SECS") {
            Some(v) => Duration::from_secs(v.parse().context("Invalid CAPPORT_SESSION_TTL_SECS")?),
            None => defaults.session_ttl,
        };

        let session_data_limit = match get("CAPPORT_SESSION_DATA_LIMIT") {
            Some(v) => v.parse().context("Invalid CAPPORT_SESSION_DATA_LIMIT")?,
            None => defaults.session_data_limit,
        };

        let usage_failure_policy = match get("CAPPORT_USAGE_FAILURE_POLICY") {
            Some(v) => UsageFailurePolicy::parse(&v)
                .context("Invalid CAPPORT_USAGE_FAILURE_POLICY")?,
            None => defaults.usage_failure_policy,
        };

        let rate_limit_per_second = match get("CAPPORT_RATE_LIMIT_PER_SECOND") {
            Some(v) => v.parse().context("Invalid CAPPORT_RATE_LIMIT_PER_SECOND")?,
            None => defaults.rate_limit_per_second,
        };

        Ok(Self {
            listen_addr,
            store,
            redis_url: get("REDIS_URL").unwrap_or(defaults.redis_url),
            store_timeout,
            create_session_url: get("CAPPORT_CREATE_SESSION_URL"),
            browse_url: get("CAPPORT_BROWSE_URL"),
            terms_url: get("CAPPORT_TERMS_URL"),
            login_url: get("CAPPORT_LOGIN_URL"),
            session_ttl,
            session_data_limit,
            usage_failure_policy,
            static_dir: get("CAPPORT_STATIC_DIR").unwrap_or(defaults.static_dir),
            rate_limit_per_second,
        })
    }
}
