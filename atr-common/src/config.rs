//! Configuration loading and resolution
//!
//! Every setting resolves in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Tiers 1 and 2 arrive together as [`ConfigOverrides`] (clap reads both);
//! tier 3 is [`TomlConfig`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5780";
pub const DEFAULT_BROKER_URL: &str = "mqtt://broker.hivemq.com:1883";
pub const DEFAULT_TOPIC: &str = "aaron_nev/atak_targets";
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CLIENT_ID_PREFIX: &str = "atak";
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_RAW_BODY_LIMIT: usize = 1024 * 1024;
pub const DEFAULT_IMAGE_FOLDER: &str = "atak_targets";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_ALLOWED_IMAGE_TYPES: [&str; 5] =
    ["image/jpeg", "image/jpg", "image/png", "image/gif", "image/webp"];

const DEFAULT_MQTT_PORT: u16 = 1883;

/// Broker delivery guarantee.
///
/// Only broker-acknowledged levels exist; fire-and-forget (QoS 0) cannot be
/// configured because it has no acknowledgment to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QualityOfService {
    /// QoS 1, acknowledged by PUBACK
    AtLeastOnce,
    /// QoS 2, acknowledged by PUBCOMP
    ExactlyOnce,
}

impl TryFrom<u8> for QualityOfService {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self> {
        match level {
            1 => Ok(QualityOfService::AtLeastOnce),
            2 => Ok(QualityOfService::ExactlyOnce),
            other => Err(Error::Config(format!(
                "QoS must be 1 or 2 (broker-acknowledged), got {}",
                other
            ))),
        }
    }
}

impl From<QualityOfService> for u8 {
    fn from(qos: QualityOfService) -> u8 {
        match qos {
            QualityOfService::AtLeastOnce => 1,
            QualityOfService::ExactlyOnce => 2,
        }
    }
}

impl FromStr for QualityOfService {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let level: u8 = s
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("QoS must be 1 or 2, got {:?}", s)))?;
        QualityOfService::try_from(level)
    }
}

impl fmt::Display for QualityOfService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Image store settings in the TOML file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImageStoreToml {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub folder: Option<String>,
}

/// TOML configuration file contents. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    pub bind_addr: Option<String>,
    pub broker_url: Option<String>,
    pub topic: Option<String>,
    pub qos: Option<QualityOfService>,
    pub publish_timeout_ms: Option<u64>,
    pub client_id_prefix: Option<String>,
    pub max_image_bytes: Option<usize>,
    pub allowed_image_types: Option<Vec<String>>,
    pub raw_body_limit: Option<usize>,
    pub log_level: Option<String>,
    #[serde(default)]
    pub image_store: ImageStoreToml,
}

/// Values supplied on the command line or through environment variables
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind_addr: Option<String>,
    pub broker_url: Option<String>,
    pub topic: Option<String>,
    pub qos: Option<QualityOfService>,
    pub publish_timeout_ms: Option<u64>,
    pub client_id_prefix: Option<String>,
    pub max_image_bytes: Option<usize>,
    pub allowed_image_types: Option<Vec<String>>,
    pub raw_body_limit: Option<usize>,
    pub log_level: Option<String>,
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub image_folder: Option<String>,
}

/// Resolved image store settings
#[derive(Debug, Clone, PartialEq)]
pub struct ImageStoreConfig {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub folder: String,
}

/// Complete credentials for a signed upload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageStoreCredentials<'a> {
    pub cloud_name: &'a str,
    pub api_key: &'a str,
    pub api_secret: &'a str,
}

impl ImageStoreConfig {
    /// Credentials if all three are configured and non-blank
    pub fn credentials(&self) -> Option<ImageStoreCredentials<'_>> {
        fn non_blank(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.trim().is_empty())
        }
        Some(ImageStoreCredentials {
            cloud_name: non_blank(&self.cloud_name)?,
            api_key: non_blank(&self.api_key)?,
            api_secret: non_blank(&self.api_secret)?,
        })
    }
}

/// Broker host and port parsed from the broker URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Fully resolved relay configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub bind_addr: String,
    pub broker_url: String,
    pub topic: String,
    pub qos: QualityOfService,
    pub publish_timeout: Duration,
    pub client_id_prefix: String,
    pub max_image_bytes: usize,
    pub allowed_image_types: Vec<String>,
    pub raw_body_limit: usize,
    pub log_level: String,
    pub image_store: ImageStoreConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            broker_url: DEFAULT_BROKER_URL.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            qos: QualityOfService::AtLeastOnce,
            publish_timeout: Duration::from_millis(DEFAULT_PUBLISH_TIMEOUT_MS),
            client_id_prefix: DEFAULT_CLIENT_ID_PREFIX.to_string(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            allowed_image_types: DEFAULT_ALLOWED_IMAGE_TYPES.iter().map(|s| s.to_string()).collect(),
            raw_body_limit: DEFAULT_RAW_BODY_LIMIT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            image_store: ImageStoreConfig {
                cloud_name: None,
                api_key: None,
                api_secret: None,
                folder: DEFAULT_IMAGE_FOLDER.to_string(),
            },
        }
    }
}

impl RelayConfig {
    /// Layer overrides over the TOML file over compiled defaults, then validate
    pub fn resolve(overrides: ConfigOverrides, file: Option<TomlConfig>) -> Result<Self> {
        let file = file.unwrap_or_default();
        let defaults = RelayConfig::default();

        let config = RelayConfig {
            bind_addr: overrides.bind_addr.or(file.bind_addr).unwrap_or(defaults.bind_addr),
            broker_url: overrides.broker_url.or(file.broker_url).unwrap_or(defaults.broker_url),
            topic: overrides.topic.or(file.topic).unwrap_or(defaults.topic),
            qos: overrides.qos.or(file.qos).unwrap_or(defaults.qos),
            publish_timeout: overrides
                .publish_timeout_ms
                .or(file.publish_timeout_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.publish_timeout),
            client_id_prefix: overrides
                .client_id_prefix
                .or(file.client_id_prefix)
                .unwrap_or(defaults.client_id_prefix),
            max_image_bytes: overrides
                .max_image_bytes
                .or(file.max_image_bytes)
                .unwrap_or(defaults.max_image_bytes),
            allowed_image_types: overrides
                .allowed_image_types
                .or(file.allowed_image_types)
                .map(|types| types.iter().map(|t| normalize_media_type(t)).collect())
                .unwrap_or(defaults.allowed_image_types),
            raw_body_limit: overrides
                .raw_body_limit
                .or(file.raw_body_limit)
                .unwrap_or(defaults.raw_body_limit),
            log_level: overrides.log_level.or(file.log_level).unwrap_or(defaults.log_level),
            image_store: ImageStoreConfig {
                cloud_name: overrides.cloud_name.or(file.image_store.cloud_name),
                api_key: overrides.api_key.or(file.image_store.api_key),
                api_secret: overrides.api_secret.or(file.image_store.api_secret),
                folder: overrides
                    .image_folder
                    .or(file.image_store.folder)
                    .unwrap_or(defaults.image_store.folder),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the relay cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(Error::Config("Topic must not be empty".to_string()));
        }
        if self.publish_timeout.is_zero() {
            return Err(Error::Config("Publish timeout must be greater than zero".to_string()));
        }
        if self.client_id_prefix.trim().is_empty() {
            return Err(Error::Config("Client id prefix must not be empty".to_string()));
        }
        if self.allowed_image_types.iter().all(|t| t.is_empty()) {
            return Err(Error::Config("At least one image type must be allowed".to_string()));
        }
        self.broker_endpoint()?;
        Ok(())
    }

    /// Parse `mqtt://host[:port]` (or `tcp://`) into host and port
    pub fn broker_endpoint(&self) -> Result<BrokerEndpoint> {
        let url = url::Url::parse(&self.broker_url)
            .map_err(|e| Error::Config(format!("Invalid broker URL {:?}: {}", self.broker_url, e)))?;

        if !matches!(url.scheme(), "mqtt" | "tcp") {
            return Err(Error::Config(format!(
                "Unsupported broker URL scheme {:?} (expected mqtt:// or tcp://)",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Config(format!("Broker URL has no host: {}", self.broker_url)))?;

        Ok(BrokerEndpoint {
            host: host.to_string(),
            port: url.port().unwrap_or(DEFAULT_MQTT_PORT),
        })
    }

    /// Whether a declared media type is on the allow-list.
    ///
    /// Comparison ignores case and any `;` parameters.
    pub fn is_allowed_image_type(&self, media_type: &str) -> bool {
        let wanted = normalize_media_type(media_type);
        self.allowed_image_types.iter().any(|t| *t == wanted)
    }
}

fn normalize_media_type(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Default TOML file location: `<config_dir>/atr/atr-submit.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("atr").join("atr-submit.toml"))
}

/// Load a TOML config file.
///
/// A missing file is not an error: a warning is logged and `None` returned so
/// startup continues on defaults. A file that exists but fails to parse is an error.
pub fn load_toml_config(path: &Path) -> Result<Option<TomlConfig>> {
    if !path.exists() {
        warn!("Config file not found at {} - using defaults", path.display());
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))?;

    info!("Loaded config file {}", path.display());
    Ok(Some(config))
}
