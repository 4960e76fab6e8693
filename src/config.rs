use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::{ProbeError, ProbeResult};

#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub services: ServicePaths,
    #[serde(default)]
    pub auth: Option<BasicAuth>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Seed for fixture sampling; entropy is used when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

// Custom Debug implementation to keep credentials out of logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("services", &self.services)
            .field("auth", &self.auth)
            .field("retry", &self.retry)
            .field("schedule", &self.schedule)
            .field("seed", &self.seed)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            services: ServicePaths::default(),
            auth: None,
            retry: RetryConfig::default(),
            schedule: ScheduleConfig::default(),
            seed: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

/// Paths of each service endpoint, relative to the base URL.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicePaths {
    #[serde(default = "default_wms_path")]
    pub wms: String,
    #[serde(default = "default_wmts_path")]
    pub wmts: String,
    #[serde(default = "default_edr_path")]
    pub edr: String,
}

impl Default for ServicePaths {
    fn default() -> Self {
        Self {
            wms: default_wms_path(),
            wmts: default_wmts_path(),
            edr: default_edr_path(),
        }
    }
}

fn default_wms_path() -> String {
    "wms".to_string()
}

fn default_wmts_path() -> String {
    "wmts".to_string()
}

fn default_edr_path() -> String {
    "edr".to_string()
}

#[derive(Clone, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

// Custom Debug implementation to redact the password
impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_test_delay_ms")]
    pub test_delay_ms: u64,
    #[serde(default = "default_category_delay_ms")]
    pub category_delay_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            test_delay_ms: default_test_delay_ms(),
            category_delay_ms: default_category_delay_ms(),
        }
    }
}

impl ScheduleConfig {
    pub fn test_delay(&self) -> Duration {
        Duration::from_millis(self.test_delay_ms)
    }

    pub fn category_delay(&self) -> Duration {
        Duration::from_millis(self.category_delay_ms)
    }
}

fn default_test_delay_ms() -> u64 {
    250
}

fn default_category_delay_ms() -> u64 {
    1_000
}

impl Config {
    pub fn load() -> ProbeResult<Arc<Self>> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("spatialprobe").required(false))
            .add_source(
                config::Environment::with_prefix("SPATIALPROBE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Config = config.try_deserialize()?;
        settings.validate()?;
        Ok(Arc::new(settings))
    }

    pub fn validate(&self) -> ProbeResult<()> {
        if self.retry.timeout_ms == 0 {
            return Err(ProbeError::Config("retry.timeout_ms must be > 0".to_string()));
        }
        self.base()?;
        Ok(())
    }

    /// Base URL with a trailing slash so service paths join underneath it.
    pub fn base(&self) -> ProbeResult<Url> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw)?;
        if url.cannot_be_a_base() {
            return Err(ProbeError::Config(format!(
                "base_url cannot be used as a base: {}",
                self.base_url
            )));
        }
        Ok(url)
    }

    fn service_url(&self, path: &str) -> ProbeResult<Url> {
        Ok(self.base()?.join(path.trim_matches('/'))?)
    }

    pub fn wms_url(&self) -> ProbeResult<Url> {
        self.service_url(&self.services.wms)
    }

    pub fn wmts_url(&self) -> ProbeResult<Url> {
        self.service_url(&self.services.wmts)
    }

    pub fn edr_url(&self) -> ProbeResult<Url> {
        self.service_url(&self.services.edr)
    }
}
