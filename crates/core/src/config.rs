//! Env-driven configuration for every vigil component.
//!
//! All knobs come from environment variables (optionally via `.env`).
//! Durations are plain seconds unless the variable name says otherwise.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::notification::Channel;

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

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env_opt(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Comma-separated list, trimmed, empties dropped.
fn env_list(key: &str, default: &str) -> Vec<String> {
    env_or(key, default)
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub bus: BusConfig,
    pub engine: EngineConfig,
    pub lifecycle: LifecycleConfig,
    pub rules: RulesConfig,
    pub scheduler: SchedulerConfig,
    pub channels: ChannelsConfig,
    pub security: SecurityConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            postgres: PostgresConfig::from_env(),
            bus: BusConfig::from_env(),
            engine: EngineConfig::from_env(),
            lifecycle: LifecycleConfig::from_env(),
            rules: RulesConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
            channels: ChannelsConfig::from_env(),
            security: SecurityConfig::from_env(),
        }
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or("VIGIL_HOST", "0.0.0.0"),
            port: env_u16("VIGIL_PORT", 8080),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Postgres ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Full connection URL. Required for any durable operation.
    pub pg_url: Option<String>,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub conn_max_lifetime_secs: u64,
}

impl PostgresConfig {
    pub fn from_env() -> Self {
        Self {
            pg_url: env_opt("PG_URL"),
            max_open_conns: env_u32("PG_MAX_OPEN_CONNS", 20),
            max_idle_conns: env_u32("PG_MAX_IDLE_CONNS", 5),
            conn_max_lifetime_secs: env_u64("PG_CONN_MAX_LIFETIME_SECS", 1800),
        }
    }

    pub fn conn_max_lifetime(&self) -> Duration {
        Duration::from_secs(self.conn_max_lifetime_secs)
    }
}

// ── Event bus ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Endpoint the input subscriber connects to.
    pub input_endpoint: String,
    /// Endpoint the output publisher binds or connects to.
    pub output_endpoint: String,
    /// Logical consumer-group name, stamped on acks and stats.
    pub consumer_group: String,
    /// Input topics to subscribe to.
    pub input_topics: Vec<String>,
}

impl BusConfig {
    pub fn from_env() -> Self {
        Self {
            input_endpoint: env_or("BUS_INPUT_ENDPOINT", "tcp://127.0.0.1:5555"),
            output_endpoint: env_or("BUS_OUTPUT_ENDPOINT", "tcp://127.0.0.1:5556"),
            consumer_group: env_or("BUS_CONSUMER_GROUP", "vigil-engine"),
            input_topics: env_list(
                "BUS_INPUT_TOPICS",
                "events.pattern_detected,events.anomaly_detected,events.investigation_created,\
                 events.investigation_updated,events.analysis_completed,events.data_quality_issues,\
                 events.system_errors,events.threshold_violations",
            ),
        }
    }
}

// ── Engine pacing ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Poll cadence of the event consumer when the bus is idle.
    pub processing_interval_secs: u64,
    /// Max messages pulled per receive call.
    pub batch_size: u32,
    /// Max redeliveries before a poisoned message is dropped.
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    /// Grace window granted to in-flight evaluations on shutdown.
    pub shutdown_grace_secs: u64,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            processing_interval_secs: env_u64("PROCESSING_INTERVAL_SECS", 5),
            batch_size: env_u32("BATCH_SIZE", 32),
            max_retries: env_u32("MAX_RETRIES", 3),
            retry_delay_secs: env_u64("RETRY_DELAY_SECS", 5),
            shutdown_grace_secs: env_u64("SHUTDOWN_GRACE_SECS", 10),
        }
    }

    pub fn processing_interval(&self) -> Duration {
        Duration::from_secs(self.processing_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

// ── Lifecycle timers ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Rolling window for correlation-id grouping.
    pub correlation_window_secs: u64,
    /// Rolling window within which same-fingerprint alerts merge.
    pub deduplication_window_secs: u64,
    /// Default expiry horizon stamped on new alerts.
    pub alert_ttl_secs: u64,
    /// Minimum age / re-escalation delay for the escalation sweep.
    pub escalation_interval_secs: u64,
    pub max_escalation_level: i32,
    /// Metadata keys folded into the alert fingerprint.
    pub fingerprint_metadata_keys: Vec<String>,
}

impl LifecycleConfig {
    pub fn from_env() -> Self {
        Self {
            correlation_window_secs: env_u64("CORRELATION_WINDOW_SECS", 1800),
            deduplication_window_secs: env_u64("DEDUPLICATION_WINDOW_SECS", 3600),
            alert_ttl_secs: env_u64("ALERT_TTL_SECS", 86_400),
            escalation_interval_secs: env_u64("ESCALATION_INTERVAL_SECS", 1800),
            max_escalation_level: env_i32("MAX_ESCALATION_LEVEL", 3),
            fingerprint_metadata_keys: env_list("FINGERPRINT_METADATA_KEYS", ""),
        }
    }

    pub fn deduplication_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.deduplication_window_secs as i64)
    }

    pub fn escalation_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.escalation_interval_secs as i64)
    }

    pub fn alert_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.alert_ttl_secs as i64)
    }
}

// ── Rule evaluation ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Cache refresh cadence.
    pub reload_interval_secs: u64,
    /// Per-rule evaluation deadline.
    pub evaluation_timeout_ms: u64,
    /// Evaluate rules concurrently (sequential fallback for debugging).
    pub parallel_evaluation: bool,
    /// Memoize per (rule, event-fingerprint) outcomes.
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    /// Hard ceiling on pool workers.
    pub max_workers: usize,
    /// Pool size = min(max_workers, cores × worker_factor).
    pub worker_factor: usize,
}

impl RulesConfig {
    pub fn from_env() -> Self {
        Self {
            reload_interval_secs: env_u64("RULES_RELOAD_INTERVAL_SECS", 60),
            evaluation_timeout_ms: env_u64("RULES_EVALUATION_TIMEOUT_MS", 500),
            parallel_evaluation: env_bool("RULES_PARALLEL_EVALUATION", true),
            cache_enabled: env_bool("RULES_CACHE_ENABLED", true),
            cache_ttl_secs: env_u64("RULES_CACHE_TTL_SECS", 60),
            max_workers: env_u64("RULES_MAX_WORKERS", 16) as usize,
            worker_factor: env_u64("RULES_WORKER_FACTOR", 2) as usize,
        }
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Effective pool size on this host.
    pub fn pool_size(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        self.max_workers.min(cores * self.worker_factor).max(1)
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub expiry_interval_secs: u64,
    pub escalation_interval_secs: u64,
    pub retention_interval_secs: u64,
    pub alert_retention_days: i64,
    pub notification_retention_days: i64,
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        Self {
            expiry_interval_secs: env_u64("SCHEDULER_EXPIRY_INTERVAL_SECS", 60),
            escalation_interval_secs: env_u64("SCHEDULER_ESCALATION_INTERVAL_SECS", 60),
            retention_interval_secs: env_u64("SCHEDULER_RETENTION_INTERVAL_SECS", 3600),
            alert_retention_days: env_u64("ALERT_RETENTION_DAYS", 90) as i64,
            notification_retention_days: env_u64("NOTIFICATION_RETENTION_DAYS", 30) as i64,
        }
    }
}

// ── Notification channels ─────────────────────────────────────

/// Tuning for one delivery channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub enabled: bool,
    pub rate_limit_per_min: u32,
    pub max_retries: i32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
}

impl ChannelConfig {
    fn from_env(prefix: &str) -> Self {
        Self {
            enabled: env_bool(&format!("{prefix}_ENABLED"), true),
            rate_limit_per_min: env_u32(&format!("{prefix}_RATE_LIMIT_PER_MIN"), 60),
            max_retries: env_i32(&format!("{prefix}_MAX_RETRIES"), 3),
            retry_delay_secs: env_u64(&format!("{prefix}_RETRY_DELAY_SECS"), 30),
            timeout_secs: env_u64(&format!("{prefix}_TIMEOUT_SECS"), 10),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Per-channel tuning plus provider endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    pub email: ChannelConfig,
    pub sms: ChannelConfig,
    pub slack: ChannelConfig,
    pub teams: ChannelConfig,
    pub webhook: ChannelConfig,
    pub pagerduty: ChannelConfig,

    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: String,
    pub slack_webhook_url: Option<String>,
    pub teams_webhook_url: Option<String>,
    pub sms_gateway_url: Option<String>,
    pub pagerduty_routing_key: Option<String>,
}

impl ChannelsConfig {
    pub fn from_env() -> Self {
        Self {
            email: ChannelConfig::from_env("CHANNEL_EMAIL"),
            sms: ChannelConfig::from_env("CHANNEL_SMS"),
            slack: ChannelConfig::from_env("CHANNEL_SLACK"),
            teams: ChannelConfig::from_env("CHANNEL_TEAMS"),
            webhook: ChannelConfig::from_env("CHANNEL_WEBHOOK"),
            pagerduty: ChannelConfig::from_env("CHANNEL_PAGERDUTY"),
            smtp_host: env_or("SMTP_HOST", "localhost"),
            smtp_port: env_u16("SMTP_PORT", 587),
            smtp_username: env_opt("SMTP_USERNAME"),
            smtp_password: env_opt("SMTP_PASSWORD"),
            smtp_from: env_or("SMTP_FROM", "vigil@localhost"),
            slack_webhook_url: env_opt("SLACK_WEBHOOK_URL"),
            teams_webhook_url: env_opt("TEAMS_WEBHOOK_URL"),
            sms_gateway_url: env_opt("SMS_GATEWAY_URL"),
            pagerduty_routing_key: env_opt("PAGERDUTY_ROUTING_KEY"),
        }
    }

    pub fn for_channel(&self, channel: Channel) -> &ChannelConfig {
        match channel {
            Channel::Email => &self.email,
            Channel::Sms => &self.sms,
            Channel::Slack => &self.slack,
            Channel::Teams => &self.teams,
            Channel::Webhook => &self.webhook,
            Channel::Pagerduty => &self.pagerduty,
        }
    }
}

// ── Security ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_tls: bool,
    pub enable_authentication: bool,
    pub encryption_key: Option<String>,
    /// Salt mixed into alert fingerprints.
    pub hash_salt: String,
}

impl SecurityConfig {
    pub fn from_env() -> Self {
        Self {
            enable_tls: env_bool("SECURITY_ENABLE_TLS", false),
            enable_authentication: env_bool("SECURITY_ENABLE_AUTHENTICATION", false),
            encryption_key: env_opt("ENCRYPTION_KEY"),
            hash_salt: env_or("HASH_SALT", "vigil"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        // Default construction must not require any env vars.
        let config = Config::from_env();
        assert!(config.rules.pool_size() >= 1);
        assert_eq!(config.lifecycle.max_escalation_level, 3);
        assert!(config.channels.email.enabled);
        assert!(!config.bus.input_topics.is_empty());
    }

    #[test]
    fn env_list_splits_and_trims() {
        assert_eq!(
            env_list("UNSET_VIGIL_TEST_KEY", "a, b ,,c"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }
}
