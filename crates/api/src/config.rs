use anyhow::{Context, Result};
use dispatch::{PollPolicy, RetryPolicy};
use plan::DedupStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub service: ServiceConfig,
    pub polling: PollingConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub planner: PlannerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    /// Idle sessions are dropped after this long. Zero keeps them forever.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

fn default_session_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub jitter_ms: u64,
    /// Omit to poll until the batch finishes or the run is cancelled.
    pub max_attempts: Option<usize>,
    pub batch_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub dedup: DedupStrategy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: "0.0.0.0:3000".to_string(),
                session_ttl_secs: default_session_ttl_secs(),
            },
            service: ServiceConfig {
                base_url: "http://localhost:8000".to_string(),
                request_timeout_secs: 60,
            },
            polling: PollingConfig {
                interval_ms: 3000,
                jitter_ms: 0,
                max_attempts: Some(200),
                batch_timeout_secs: None,
            },
            retry: RetryConfig {
                max_retries: 3,
                initial_backoff_ms: 1000,
                max_backoff_ms: 10000,
            },
            cache: CacheConfig {
                enabled: true,
                max_entries: 10000,
            },
            planner: PlannerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Poll forever at a fixed interval, never giving up on a batch.
    pub fn patient_mode() -> Self {
        let mut config = Self::default();
        config.polling.max_attempts = None;
        config.polling.batch_timeout_secs = None;
        config
    }

    /// Give up quickly on a stuck backend.
    pub fn strict_mode() -> Self {
        let mut config = Self::default();
        config.polling = PollingConfig {
            interval_ms: 3000,
            jitter_ms: 500,
            max_attempts: Some(40),
            batch_timeout_secs: Some(120),
        };
        config.retry = RetryConfig {
            max_retries: 1,
            initial_backoff_ms: 500,
            max_backoff_ms: 1000,
        };
        config
    }

    pub fn for_mode(mode: &str) -> Result<Self> {
        match mode {
            "default" => Ok(Self::default()),
            "patient" => Ok(Self::patient_mode()),
            "strict" => Ok(Self::strict_mode()),
            other => anyhow::bail!("Unknown mode: {}", other),
        }
    }

    /// The TOML file at `GRAPHQA_CONFIG` if set, else the preset named by
    /// `GRAPHQA_MODE`, then env overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("GRAPHQA_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let mode = std::env::var("GRAPHQA_MODE").unwrap_or_else(|_| "default".to_string());
                Self::for_mode(&mode)?
            }
        };
        if let Ok(url) = std::env::var("GRAPHQA_SERVICE_URL") {
            config.service.base_url = url;
        }
        if let Ok(bind) = std::env::var("GRAPHQA_BIND") {
            config.server.bind = bind;
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.polling.interval_ms),
            jitter: Duration::from_millis(self.polling.jitter_ms),
            max_attempts: self.polling.max_attempts,
            timeout: self.polling.batch_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            self.retry.initial_backoff_ms,
            self.retry.max_backoff_ms,
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.service.request_timeout_secs)
    }

    pub fn session_ttl(&self) -> Option<Duration> {
        (self.server.session_ttl_secs > 0).then(|| Duration::from_secs(self.server.session_ttl_secs))
    }
}
