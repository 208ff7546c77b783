use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::classifier::http_classifier::RequestFormat;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 20;
const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_STORAGE_BUCKET: &str = "animal-images";
const DEFAULT_AWS_REGION: &str = "us-east-1";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Whether `/predict` waits for storage before answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceMode {
    Background,
    Sync,
}

impl FromStr for PersistenceMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "background" | "async" => Ok(PersistenceMode::Background),
            "sync" | "synchronous" => Ok(PersistenceMode::Sync),
            _ => Err(()),
        }
    }
}

#[derive(Clone)]
pub enum StoreConfig {
    Supabase {
        url: Url,
        service_key: String,
        bucket: String,
    },
    Aws {
        region: String,
        bucket: String,
        public_base_url: Option<String>,
        captured_table: String,
        labeled_table: String,
    },
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreConfig::Supabase { url, bucket, .. } => f
                .debug_struct("Supabase")
                .field("url", &url.as_str())
                .field("bucket", bucket)
                .finish_non_exhaustive(),
            StoreConfig::Aws {
                region,
                bucket,
                captured_table,
                labeled_table,
                ..
            } => f
                .debug_struct("Aws")
                .field("region", region)
                .field("bucket", bucket)
                .field("captured_table", captured_table)
                .field("labeled_table", labeled_table)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub model_url: Url,
    pub model_api_token: Option<String>,
    pub model_request_format: RequestFormat,
    pub store: StoreConfig,
    pub download_timeout: Duration,
    pub classifier_timeout: Duration,
    pub max_upload_bytes: usize,
    pub persistence_mode: PersistenceMode,
    pub queue_capacity: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("model_url", &self.model_url.as_str())
            .field("model_api_token", &self.model_api_token.as_ref().map(|_| "<redacted>"))
            .field("model_request_format", &self.model_request_format)
            .field("store", &self.store)
            .field("download_timeout", &self.download_timeout)
            .field("classifier_timeout", &self.classifier_timeout)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("persistence_mode", &self.persistence_mode)
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads every setting through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let model_url = parse_url("MODEL_URL", &require("MODEL_URL")?)?;
        let model_api_token = get("MODEL_API_TOKEN").or_else(|| get("HF_TOKEN"));

        let model_request_format = match get("MODEL_REQUEST_FORMAT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "MODEL_REQUEST_FORMAT",
                value,
            })?,
            None => RequestFormat::Multipart,
        };

        let backend = get("STORE_BACKEND").unwrap_or_else(|| "supabase".to_string());
        let store = match backend.trim().to_ascii_lowercase().as_str() {
            "supabase" => StoreConfig::Supabase {
                url: parse_url("SUPABASE_URL", &require("SUPABASE_URL")?)?,
                service_key: require("SUPABASE_SERVICE_KEY")?,
                bucket: get("STORAGE_BUCKET").unwrap_or_else(|| DEFAULT_STORAGE_BUCKET.to_string()),
            },
            "aws" => StoreConfig::Aws {
                region: get("AWS_REGION").unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
                bucket: require("S3_BUCKET_NAME")?,
                public_base_url: get("S3_PUBLIC_BASE_URL")
                    .map(|u| u.trim_end_matches('/').to_string()),
                captured_table: get("DYNAMODB_CAPTURED_TABLE")
                    .unwrap_or_else(|| "captured_images".to_string()),
                labeled_table: get("DYNAMODB_LABELED_TABLE")
                    .unwrap_or_else(|| "labeled_images".to_string()),
            },
            _ => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    value: backend,
                });
            }
        };

        let persistence_mode = match get("PREDICT_PERSISTENCE") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "PREDICT_PERSISTENCE",
                value,
            })?,
            None => PersistenceMode::Background,
        };

        Ok(Self {
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            model_url,
            model_api_token,
            model_request_format,
            store,
            download_timeout: Duration::from_secs(parse_or(
                "DOWNLOAD_TIMEOUT_SECS",
                get("DOWNLOAD_TIMEOUT_SECS"),
                DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            )?),
            classifier_timeout: Duration::from_secs(parse_or(
                "CLASSIFIER_TIMEOUT_SECS",
                get("CLASSIFIER_TIMEOUT_SECS"),
                DEFAULT_CLASSIFIER_TIMEOUT_SECS,
            )?),
            max_upload_bytes: parse_or(
                "MAX_UPLOAD_BYTES",
                get("MAX_UPLOAD_BYTES"),
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            persistence_mode,
            queue_capacity: parse_or(
                "PERSISTENCE_QUEUE_CAPACITY",
                get("PERSISTENCE_QUEUE_CAPACITY"),
                DEFAULT_QUEUE_CAPACITY,
            )?
            .max(1),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

fn parse_or<T: FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
