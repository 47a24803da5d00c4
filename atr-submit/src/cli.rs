//! Command-line arguments for atr-submit
//!
//! Every flag also reads an environment variable; clap gives the flag priority.
//! Anything left unset falls through to the TOML file, then to built-in defaults.

use std::path::PathBuf;

use atr_common::config::{default_config_path, ConfigOverrides, QualityOfService};
use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(name = "atr-submit")]
#[command(about = "Target observation relay: HTTP submissions to an MQTT topic")]
#[command(version)]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "ATR_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP listen address (host:port)
    #[arg(short, long, env = "ATR_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// MQTT broker URL (mqtt://host:port)
    #[arg(long, env = "ATR_BROKER_URL")]
    pub broker_url: Option<String>,

    /// MQTT topic receiving envelopes
    #[arg(short, long, env = "ATR_TOPIC")]
    pub topic: Option<String>,

    /// Delivery guarantee (1 or 2)
    #[arg(long, env = "ATR_QOS")]
    pub qos: Option<QualityOfService>,

    /// Publish deadline in milliseconds
    #[arg(long, env = "ATR_PUBLISH_TIMEOUT_MS")]
    pub publish_timeout_ms: Option<u64>,

    /// Prefix for per-publish MQTT client ids
    #[arg(long, env = "ATR_CLIENT_ID_PREFIX")]
    pub client_id_prefix: Option<String>,

    /// Largest accepted image in bytes
    #[arg(long, env = "ATR_MAX_IMAGE_BYTES")]
    pub max_image_bytes: Option<usize>,

    /// Accepted image media types, comma separated
    #[arg(long, env = "ATR_ALLOWED_IMAGE_TYPES", value_delimiter = ',')]
    pub allowed_image_types: Option<Vec<String>>,

    /// Largest accepted raw JSON body in bytes
    #[arg(long, env = "ATR_RAW_BODY_LIMIT")]
    pub raw_body_limit: Option<usize>,

    /// Log level when RUST_LOG is unset
    #[arg(long, env = "ATR_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, env = "CLOUDINARY_CLOUD_NAME")]
    pub cloud_name: Option<String>,

    #[arg(long, env = "CLOUDINARY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "CLOUDINARY_API_SECRET", hide_env_values = true)]
    pub api_secret: Option<String>,

    /// Image store folder for uploads
    #[arg(long, env = "ATR_IMAGE_FOLDER")]
    pub image_folder: Option<String>,
}

impl Args {
    /// Explicit file, else the per-user default location
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(default_config_path)
    }

    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind_addr: self.bind_addr.clone(),
            broker_url: self.broker_url.clone(),
            topic: self.topic.clone(),
            qos: self.qos,
            publish_timeout_ms: self.publish_timeout_ms,
            client_id_prefix: self.client_id_prefix.clone(),
            max_image_bytes: self.max_image_bytes,
            allowed_image_types: self.allowed_image_types.clone(),
            raw_body_limit: self.raw_body_limit,
            log_level: self.log_level.clone(),
            cloud_name: self.cloud_name.clone(),
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
            image_folder: self.image_folder.clone(),
        }
    }
}
