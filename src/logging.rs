//! Structured logging for the dashboard data layer.
//!
//! One JSON object per line on stderr, so stdout stays free for the CLI
//! snapshot. Records carry a run id, a sequence number and a domain for
//! filtering. Debug and trace records are only emitted when the debug flag
//! is on (`SALESDASH_DEBUG`), whatever `LOG_LEVEL` says.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use crate::config::Config;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Fetch,  // Remote procedure calls
    Cache,  // Hits, shared in-flight requests, evictions
    Window, // QTD/YTD resolution and merging
    Drill,  // Drill-down transitions
    View,   // Panel lifecycle
    System, // Startup, config
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Fetch => "fetch",
            Domain::Cache => "cache",
            Domain::Window => "window",
            Domain::Drill => "drill",
            Domain::View => "view",
            Domain::System => "system",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Global context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static DEBUG: AtomicBool = AtomicBool::new(false);
static RUN_ID: OnceLock<String> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

fn run_id() -> &'static str {
    RUN_ID.get_or_init(|| {
        std::env::var("RUN_ID").unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()))
    })
}

/// Apply the logging switches from configuration.
pub fn init(cfg: &Config) {
    set_debug(cfg.debug);
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("supabase_url", v_str(&cfg.supabase_url)),
            ("debug", json!(cfg.debug)),
            ("cache_ttl_secs", json!(cfg.cache_ttl_secs)),
        ]),
    );
}

pub fn set_debug(enabled: bool) {
    DEBUG.store(enabled, Ordering::SeqCst);
}

pub fn debug_enabled() -> bool {
    DEBUG.load(Ordering::SeqCst)
}

/// Whether a record at `level` passes the debug gate and the minimum level.
pub fn should_emit(level: Level, min_level: Level, debug: bool) -> bool {
    if level <= Level::Debug && !debug {
        return false;
    }
    level >= min_level
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in ["authorization", "Authorization", "apikey", "anon_key"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if !should_emit(level, Level::from_env(), debug_enabled()) || !domain.is_enabled() {
        return;
    }
    let line = render_record(level, domain, event, fields);
    let mut err = std::io::stderr().lock();
    let _ = writeln!(err, "{}", line);
}

fn render_record(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) -> String {
    let mut data = sanitize_fields(fields);
    let msg = data.remove("msg").unwrap_or(Value::String(String::new()));

    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(run_id()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(domain.as_str()));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    entry.insert("data".to_string(), Value::Object(data));
    Value::Object(entry).to_string()
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_rpc_call(procedure: &str, params: &Map<String, Value>) {
    log(
        Level::Debug,
        Domain::Fetch,
        "rpc_call",
        obj(&[("procedure", v_str(procedure)), ("params", Value::Object(params.clone()))]),
    );
}

pub fn log_rpc_failure(procedure: &str, error: &str) {
    log(
        Level::Warn,
        Domain::Fetch,
        "rpc_failed",
        obj(&[("procedure", v_str(procedure)), ("msg", v_str(error))]),
    );
}

pub fn log_cache(event: &str, procedure: &str, key_hash: &str) {
    log(
        Level::Trace,
        Domain::Cache,
        event,
        obj(&[("procedure", v_str(procedure)), ("key", v_str(key_hash))]),
    );
}

pub fn log_window_merge(operation: &str, months: &[&str], groups: usize) {
    log(
        Level::Debug,
        Domain::Window,
        "merged",
        obj(&[
            ("operation", v_str(operation)),
            ("months", Value::Array(months.iter().map(|m| v_str(m)).collect())),
            ("groups", json!(groups)),
        ]),
    );
}

pub fn log_drill(action: &str, level: &str) {
    log(
        Level::Debug,
        Domain::Drill,
        "transition",
        obj(&[("action", v_str(action)), ("level", v_str(level))]),
    );
}

pub fn log_panel(panel: &str, outcome: &str, generation: u64) {
    log(
        Level::Debug,
        Domain::View,
        "panel",
        obj(&[
            ("panel", v_str(panel)),
            ("outcome", v_str(outcome)),
            ("generation", json!(generation)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn params_hash(input: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut h);
    format!("{:x}", h.finish())
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Emits the elapsed time of a scope at trace level on drop.
pub struct ProfileScope {
    domain: Domain,
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
}

impl ProfileScope {
    pub fn new(domain: Domain, label: &'static str) -> Self {
        Self {
            domain,
            label,
            context: None,
            started: Instant::now(),
        }
    }

    pub fn with_context(domain: Domain, label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self {
            domain,
            label,
            context: if debug_enabled() { Some(obj(fields)) } else { None },
            started: Instant::now(),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if !debug_enabled() {
            return;
        }
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, self.domain, "profile", fields);
    }
}

// =============================================================================
// Tests
// =============================================================================
