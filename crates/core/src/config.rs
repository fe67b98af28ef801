use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CanaryError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

/// Everything the historian core consumes, handed over once at construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub historian: HistorianConfig,
    pub resilience: ResilienceConfig,
    pub cache: CacheConfig,
    pub resolver: ResolverConfig,
    pub query: QueryConfig,
    pub catalog: CatalogConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CANARY_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_opt("CANARY_PROFILE").unwrap_or_default();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            historian: HistorianConfig::from_env_profiled(p),
            resilience: ResilienceConfig::from_env_profiled(p),
            cache: CacheConfig::from_env_profiled(p),
            resolver: ResolverConfig::from_env_profiled(p),
            query: QueryConfig::from_env_profiled(p),
            catalog: CatalogConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject values that would make the core misbehave rather than degrade.
    pub fn validate(&self) -> Result<(), CanaryError> {
        let r = &self.resilience;
        if r.retry_max_attempts == 0 {
            return Err(CanaryError::invalid_config("retry_max_attempts must be at least 1"));
        }
        if r.retry_max_delay_ms < r.retry_base_delay_ms {
            return Err(CanaryError::invalid_config(
                "retry_max_delay_ms must not be smaller than retry_base_delay_ms",
            ));
        }
        if r.circuit_failure_threshold == 0 {
            return Err(CanaryError::invalid_config("circuit_failure_threshold must be at least 1"));
        }
        if r.response_max_bytes == 0 {
            return Err(CanaryError::invalid_config("response_max_bytes must be positive"));
        }
        if self.query.page_size == 0 || self.query.max_pages == 0 {
            return Err(CanaryError::invalid_config("page_size and max_pages must be positive"));
        }
        if self.historian.base_urls.is_empty() {
            return Err(CanaryError::invalid_config("at least one CANARY_VIEWS_URL is required"));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  historian:   urls={}, token={}",
            self.historian.base_urls.join(","),
            if self.historian.api_token.is_some() { "set" } else { "(none)" }
        );
        tracing::info!(
            "  resilience:  attempts={}, breaker={}/{}s, max_bytes={}",
            self.resilience.retry_max_attempts,
            self.resilience.circuit_failure_threshold,
            self.resilience.circuit_reset_timeout_secs,
            self.resilience.response_max_bytes
        );
        tracing::info!(
            "  cache:       metadata={}s, timeseries={}s, namespace={}s, max={}MB",
            self.cache.metadata_ttl_secs,
            self.cache.timeseries_ttl_secs,
            self.cache.namespace_ttl_secs,
            self.cache.max_mb
        );
        tracing::info!("  catalog:     path={}", self.catalog.path.display());
    }

    /// Return a redacted view safe for tool responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "historian": {
                "base_urls": self.historian.base_urls,
                "application": self.historian.application,
                "timezone": self.historian.timezone,
                "configured": self.historian.is_configured(),
            },
            "resilience": {
                "retry_max_attempts": self.resilience.retry_max_attempts,
                "circuit_failure_threshold": self.resilience.circuit_failure_threshold,
                "circuit_reset_timeout_secs": self.resilience.circuit_reset_timeout_secs,
                "response_max_bytes": self.resilience.response_max_bytes,
            },
            "cache": {
                "metadata_ttl_secs": self.cache.metadata_ttl_secs,
                "timeseries_ttl_secs": self.cache.timeseries_ttl_secs,
                "namespace_ttl_secs": self.cache.namespace_ttl_secs,
                "max_mb": self.cache.max_mb,
            },
            "query": {
                "page_size": self.query.page_size,
                "max_pages": self.query.max_pages,
                "max_tags": self.query.max_tags,
            },
            "catalog": { "path": self.catalog.path },
        })
    }
}

// ── Historian endpoint ────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct HistorianConfig {
    /// Views API base URLs, tried in order on connect failures.
    pub base_urls: Vec<String>,
    pub api_token: Option<String>,
    pub application: String,
    pub timezone: String,
    pub request_timeout_secs: u64,
    pub session_refresh_margin_secs: u64,
    /// Token lifetime assumed when the server omits `expiresInMs`.
    pub session_ttl_secs: u64,
}

impl HistorianConfig {
    fn from_env_profiled(p: &str) -> Self {
        let urls = profiled_env_or(p, "CANARY_VIEWS_URL", "http://localhost:55235");
        Self {
            base_urls: urls
                .split(',')
                .map(|u| u.trim().trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            api_token: profiled_env_opt(p, "CANARY_API_TOKEN"),
            application: profiled_env_or(p, "CANARY_APPLICATION", "canary-mcp"),
            timezone: profiled_env_or(p, "CANARY_TIMEZONE", "UTC"),
            request_timeout_secs: profiled_env_u64(p, "CANARY_REQUEST_TIMEOUT_SECS", 30),
            session_refresh_margin_secs: profiled_env_u64(p, "CANARY_SESSION_REFRESH_MARGIN_SECS", 30),
            session_ttl_secs: profiled_env_u64(p, "CANARY_SESSION_TTL_SECS", 600),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_token.is_some() && !self.base_urls.is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.session_refresh_margin_secs)
    }
}

impl Default for HistorianConfig {
    fn default() -> Self {
        Self {
            base_urls: vec!["http://localhost:55235".to_string()],
            api_token: None,
            application: "canary-mcp".to_string(),
            timezone: "UTC".to_string(),
            request_timeout_secs: 30,
            session_refresh_margin_secs: 30,
            session_ttl_secs: 600,
        }
    }
}

// The credential must never reach a log line through `{:?}`.
impl std::fmt::Debug for HistorianConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistorianConfig")
            .field("base_urls", &self.base_urls)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("application", &self.application)
            .field("timezone", &self.timezone)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("session_refresh_margin_secs", &self.session_refresh_margin_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .finish()
    }
}

// ── Retry / breaker / size guard ──────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter_ms: u64,
    pub circuit_failure_threshold: u32,
    pub circuit_reset_timeout_secs: u64,
    pub response_max_bytes: usize,
}

impl ResilienceConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            retry_max_attempts: profiled_env_u32(p, "CANARY_RETRY_MAX_ATTEMPTS", 4),
            retry_base_delay_ms: profiled_env_u64(p, "CANARY_RETRY_BASE_DELAY_MS", 200),
            retry_max_delay_ms: profiled_env_u64(p, "CANARY_RETRY_MAX_DELAY_MS", 5000),
            retry_jitter_ms: profiled_env_u64(p, "CANARY_RETRY_JITTER_MS", 100),
            circuit_failure_threshold: profiled_env_u32(p, "CANARY_CIRCUIT_FAILURE_THRESHOLD", 5),
            circuit_reset_timeout_secs: profiled_env_u64(p, "CANARY_CIRCUIT_RESET_TIMEOUT_SECS", 60),
            response_max_bytes: profiled_env_usize(p, "CANARY_RESPONSE_MAX_BYTES", 1_000_000),
        }
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_reset_timeout_secs)
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry_max_attempts: 4,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 5000,
            retry_jitter_ms: 100,
            circuit_failure_threshold: 5,
            circuit_reset_timeout_secs: 60,
            response_max_bytes: 1_000_000,
        }
    }
}

// ── Cache ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub metadata_ttl_secs: u64,
    pub timeseries_ttl_secs: u64,
    pub namespace_ttl_secs: u64,
    pub max_mb: u64,
}

impl CacheConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            metadata_ttl_secs: profiled_env_u64(p, "CANARY_CACHE_METADATA_TTL_SECS", 3600),
            timeseries_ttl_secs: profiled_env_u64(p, "CANARY_CACHE_TIMESERIES_TTL_SECS", 300),
            namespace_ttl_secs: profiled_env_u64(p, "CANARY_CACHE_NAMESPACE_TTL_SECS", 3600),
            max_mb: profiled_env_u64(p, "CANARY_CACHE_MAX_MB", 100),
        }
    }

    pub fn max_bytes(&self) -> usize {
        (self.max_mb as usize).saturating_mul(1_048_576)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            metadata_ttl_secs: 3600,
            timeseries_ttl_secs: 300,
            namespace_ttl_secs: 3600,
            max_mb: 100,
        }
    }
}

// ── Resolution ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Below this many catalog hits, one remote search is issued.
    pub min_candidates: usize,
    pub candidate_limit: usize,
    /// How many top candidates get a metadata lookup.
    pub enrich_limit: usize,
}

impl ResolverConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            min_candidates: profiled_env_usize(p, "CANARY_RESOLVER_MIN_CANDIDATES", 3),
            candidate_limit: profiled_env_usize(p, "CANARY_RESOLVER_CANDIDATE_LIMIT", 10),
            enrich_limit: profiled_env_usize(p, "CANARY_RESOLVER_ENRICH_LIMIT", 5),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_candidates: 3,
            candidate_limit: 10,
            enrich_limit: 5,
        }
    }
}

// ── Timeseries queries ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub page_size: u32,
    pub max_pages: u32,
    pub max_tags: usize,
}

impl QueryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            page_size: profiled_env_u32(p, "CANARY_QUERY_PAGE_SIZE", 1000),
            max_pages: profiled_env_u32(p, "CANARY_QUERY_MAX_PAGES", 20),
            max_tags: profiled_env_usize(p, "CANARY_QUERY_MAX_TAGS", 50),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            max_pages: 20,
            max_tags: 50,
        }
    }
}

// ── Local catalog ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

impl CatalogConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            path: PathBuf::from(profiled_env_or(p, "CANARY_CATALOG_PATH", "data/tag_catalog.json")),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/tag_catalog.json"),
        }
    }
}
