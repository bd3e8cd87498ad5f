use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
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

fn profiled_env_parse<T: FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub store: StoreConfig,
    pub scenario: ScenarioConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `REINDEX_PROFILE`. When set (e.g. `STAGING`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("REINDEX_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            store: StoreConfig::from_env_profiled(p),
            scenario: ScenarioConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  store:     backend={}, url={}", self.store.backend, self.store.url);
        tracing::info!(
            "  scenario:  {} -> {}, documents={}, settle={}ms ({}), throughput={}",
            self.scenario.source_collection,
            self.scenario.dest_collection,
            self.scenario.document_count,
            self.scenario.settle_delay_ms,
            self.scenario.settle_mode,
            self.scenario.throughput_label(),
        );
    }

    /// Return a redacted view safe for printing (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "store": {
                "backend": self.store.backend,
                "url": self.store.url,
                "authenticated": self.store.username.is_some(),
                "timeout_secs": self.store.timeout_secs,
            },
            "scenario": self.scenario,
        })
    }
}

// ── Store ─────────────────────────────────────────────────────

/// Which document store implementation to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store, no external service needed.
    Memory,
    /// Elasticsearch / OpenSearch over REST.
    Http,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => f.write_str("memory"),
            StoreBackend::Http => f.write_str("http"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "http" | "elasticsearch" | "opensearch" => Ok(StoreBackend::Http),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Base URL of the Elasticsearch / OpenSearch node.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout for ordinary calls. Bulk copies wait without a timeout.
    pub timeout_secs: u64,
}

impl StoreConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            backend: profiled_env_parse(p, "STORE_BACKEND", StoreBackend::Memory),
            url: profiled_env_or(p, "ES_URL", "http://localhost:9200"),
            username: profiled_env_opt(p, "ES_USERNAME"),
            password: profiled_env_opt(p, "ES_PASSWORD"),
            timeout_secs: profiled_env_parse(p, "ES_TIMEOUT_SECS", 30),
        }
    }
}

// ── Scenario ──────────────────────────────────────────────────

/// Slowest bulk-copy rate accepted, in docs/sec.
pub const MIN_THROUGHPUT: f64 = 1.0;

/// Normalize a configured docs/sec cap. Zero, negative and non-finite
/// values mean unthrottled; positive rates below [`MIN_THROUGHPUT`] are
/// raised to it.
pub fn throughput_limit(rate: f64) -> Option<f64> {
    if !rate.is_finite() || rate <= 0.0 {
        return None;
    }
    if rate < MIN_THROUGHPUT {
        tracing::warn!(rate, min = MIN_THROUGHPUT, "throughput limit too small, clamping");
        return Some(MIN_THROUGHPUT);
    }
    Some(rate)
}

/// How the scenario decides that phase one has taken its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettleMode {
    /// Sleep for the settle delay only.
    Delay,
    /// Wait for the store's enumeration-started signal only.
    Signal,
    /// Wait for the signal, then sleep for the settle delay.
    SignalThenDelay,
}

impl fmt::Display for SettleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettleMode::Delay => f.write_str("delay"),
            SettleMode::Signal => f.write_str("signal"),
            SettleMode::SignalThenDelay => f.write_str("signal+delay"),
        }
    }
}

impl FromStr for SettleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delay" => Ok(SettleMode::Delay),
            "signal" => Ok(SettleMode::Signal),
            "signal+delay" | "signal-then-delay" => Ok(SettleMode::SignalThenDelay),
            other => Err(format!("unknown settle mode '{other}'")),
        }
    }
}

/// Parameters of the scripted migration scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub source_collection: String,
    pub dest_collection: String,
    /// Size of the seed dataset; ids are `1..=document_count`.
    pub document_count: u64,
    pub seed_batch_size: usize,
    pub settle_delay_ms: u64,
    pub settle_mode: SettleMode,
    /// Docs/sec cap on each bulk copy. `None` = unthrottled.
    pub throughput_limit: Option<f64>,
    pub update_id: String,
    pub delete_id: String,
    pub create_id: String,
}

impl ScenarioConfig {
    fn from_env_profiled(p: &str) -> Self {
        let throughput: f64 = profiled_env_parse(p, "THROUGHPUT_LIMIT", 5000.0);
        Self {
            source_collection: profiled_env_or(p, "SOURCE_INDEX", "test_1"),
            dest_collection: profiled_env_or(p, "DEST_INDEX", "test_2"),
            document_count: profiled_env_parse(p, "DOCUMENT_COUNT", 100_000),
            seed_batch_size: profiled_env_parse(p, "SEED_BATCH_SIZE", 2_500),
            settle_delay_ms: profiled_env_parse(p, "SETTLE_DELAY_MS", 3_000),
            settle_mode: profiled_env_parse(p, "SETTLE_MODE", SettleMode::SignalThenDelay),
            throughput_limit: throughput_limit(throughput),
            update_id: profiled_env_or(p, "UPDATE_DOC_ID", "10000"),
            delete_id: profiled_env_or(p, "DELETE_DOC_ID", "20000"),
            create_id: profiled_env_or(p, "CREATE_DOC_ID", "999999999"),
        }
    }

    pub fn throughput_label(&self) -> String {
        match self.throughput_limit {
            Some(rate) => format!("{rate} docs/s"),
            None => "unthrottled".to_string(),
        }
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            source_collection: "test_1".to_string(),
            dest_collection: "test_2".to_string(),
            document_count: 100_000,
            seed_batch_size: 2_500,
            settle_delay_ms: 3_000,
            settle_mode: SettleMode::SignalThenDelay,
            throughput_limit: Some(5000.0),
            update_id: "10000".to_string(),
            delete_id: "20000".to_string(),
            create_id: "999999999".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_backend_aliases() {
        assert_eq!("opensearch".parse::<StoreBackend>().unwrap(), StoreBackend::Http);
        assert_eq!("MEMORY".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn parse_settle_modes() {
        assert_eq!("signal+delay".parse::<SettleMode>().unwrap(), SettleMode::SignalThenDelay);
        assert_eq!("Delay".parse::<SettleMode>().unwrap(), SettleMode::Delay);
        assert!("later".parse::<SettleMode>().is_err());
    }

    #[test]
    fn profiled_lookup_prefers_prefixed_key() {
        // Unique key names so parallel tests do not interfere.
        env::set_var("CFGTEST_REINDEX_PROBE", "prefixed");
        env::set_var("REINDEX_PROBE", "plain");
        assert_eq!(profiled_env_or("CFGTEST", "REINDEX_PROBE", "x"), "prefixed");
        assert_eq!(profiled_env_or("", "REINDEX_PROBE", "x"), "plain");
        assert_eq!(profiled_env_or("CFGTEST", "REINDEX_PROBE_MISSING", "x"), "x");
        env::remove_var("CFGTEST_REINDEX_PROBE");
        env::remove_var("REINDEX_PROBE");
    }

    #[test]
    fn redacted_summary_hides_credentials() {
        let mut config = Config::for_profile("");
        config.store.password = Some("hunter2".to_string());
        let rendered = config.redacted_summary().to_string();
        assert!(!rendered.contains("hunter2"));
        assert_eq!(config.profile_label(), "default");
    }

    #[test]
    fn throughput_limit_is_normalized() {
        assert_eq!(throughput_limit(5000.0), Some(5000.0));
        assert_eq!(throughput_limit(0.0), None);
        assert_eq!(throughput_limit(-3.0), None);
        assert_eq!(throughput_limit(f64::NAN), None);
        assert_eq!(throughput_limit(f64::INFINITY), None);
        assert_eq!(throughput_limit(1e-20), Some(MIN_THROUGHPUT));
    }

    #[test]
    fn scenario_defaults_match_reference_run() {
        let s = ScenarioConfig::default();
        assert_eq!(s.document_count, 100_000);
        assert_eq!(s.throughput_label(), "5000 docs/s");
    }
}
