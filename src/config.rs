use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub supabase_url: String,
    pub anon_key: Option<String>,
    pub request_timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub top_n_limit: usize,
    /// Enables debug/trace log records. Off unless explicitly requested.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: "http://127.0.0.1:54321".to_string(),
            anon_key: None,
            request_timeout_ms: 15_000,
            cache_ttl_secs: 60,
            top_n_limit: 5,
            debug: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            supabase_url: std::env::var("SUPABASE_URL").unwrap_or(defaults.supabase_url),
            anon_key: std::env::var("SUPABASE_ANON_KEY").ok().filter(|k| !k.is_empty()),
            request_timeout_ms: std::env::var("REQUEST_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.request_timeout_ms),
            cache_ttl_secs: std::env::var("CACHE_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.cache_ttl_secs),
            top_n_limit: std::env::var("TOP_N_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.top_n_limit),
            debug: std::env::var("SALESDASH_DEBUG").map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")).unwrap_or(false),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Base URL for remote procedure calls, without a trailing slash.
    pub fn rpc_base(&self) -> String {
        format!("{}/rest/v1/rpc", self.supabase_url.trim_end_matches('/'))
    }
}
