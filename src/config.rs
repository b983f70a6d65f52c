// src/config.rs
use dotenv::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::aws::AwsSettings;
use crate::common::ConfigError;
use crate::rabbitmq::ConsumerSettings;
use crate::supervisor::SupervisorSettings;

pub const MAPPING_FILE: &str = "MAPPING_FILE";
pub const RABBIT_PREFETCH_COUNT: &str = "RABBIT_PREFETCH_COUNT";
pub const RABBIT_CONNECT_TIMEOUT_SECONDS: &str = "RABBIT_CONNECT_TIMEOUT_SECONDS";
pub const HEALTH_CHECK_INTERVAL_SECONDS: &str = "HEALTH_CHECK_INTERVAL_SECONDS";
pub const HEALTH_CHECK_TIMEOUT_MS: &str = "HEALTH_CHECK_TIMEOUT_MS";
pub const RESTART_BACKOFF_MS: &str = "RESTART_BACKOFF_MS";
pub const RESTART_BACKOFF_MAX_MS: &str = "RESTART_BACKOFF_MAX_MS";
pub const AWS_REGION: &str = "AWS_REGION";
pub const AWS_SNS_ENDPOINT: &str = "AWS_SNS_ENDPOINT";
pub const AWS_SQS_ENDPOINT: &str = "AWS_SQS_ENDPOINT";
pub const AWS_LAMBDA_ENDPOINT: &str = "AWS_LAMBDA_ENDPOINT";

// Default values
fn default_prefetch_count() -> u16 {
    10
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

fn default_health_check_interval_seconds() -> u64 {
    30
}

fn default_health_check_timeout_ms() -> u64 {
    2000
}

fn default_restart_backoff_ms() -> u64 {
    1000
}

fn default_restart_backoff_max_ms() -> u64 {
    30000
}

/// Process configuration of the forwarder binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub mapping_file: PathBuf,
    pub rabbit_prefetch_count: u16,
    pub rabbit_connect_timeout_seconds: u64,
    pub health_check_interval_seconds: u64,
    pub health_check_timeout_ms: u64,
    pub restart_backoff_ms: u64,
    pub restart_backoff_max_ms: u64,
    pub aws_region: Option<String>,
    pub aws_sns_endpoint: Option<String>,
    pub aws_sqs_endpoint: Option<String>,
    pub aws_lambda_endpoint: Option<String>,
}

impl Config {
    /// Read the environment, after loading a `.env` file if one exists.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mapping_file = get(MAPPING_FILE)
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing(MAPPING_FILE))?;

        let config = Config {
            mapping_file,
            rabbit_prefetch_count: parse_or(
                RABBIT_PREFETCH_COUNT,
                get(RABBIT_PREFETCH_COUNT),
                default_prefetch_count,
            )?,
            rabbit_connect_timeout_seconds: parse_or(
                RABBIT_CONNECT_TIMEOUT_SECONDS,
                get(RABBIT_CONNECT_TIMEOUT_SECONDS),
                default_connect_timeout_seconds,
            )?,
            health_check_interval_seconds: parse_or(
                HEALTH_CHECK_INTERVAL_SECONDS,
                get(HEALTH_CHECK_INTERVAL_SECONDS),
                default_health_check_interval_seconds,
            )?,
            health_check_timeout_ms: parse_or(
                HEALTH_CHECK_TIMEOUT_MS,
                get(HEALTH_CHECK_TIMEOUT_MS),
                default_health_check_timeout_ms,
            )?,
            restart_backoff_ms: parse_or(
                RESTART_BACKOFF_MS,
                get(RESTART_BACKOFF_MS),
                default_restart_backoff_ms,
            )?,
            restart_backoff_max_ms: parse_or(
                RESTART_BACKOFF_MAX_MS,
                get(RESTART_BACKOFF_MAX_MS),
                default_restart_backoff_max_ms,
            )?,
            aws_region: get(AWS_REGION),
            aws_sns_endpoint: get(AWS_SNS_ENDPOINT),
            aws_sqs_endpoint: get(AWS_SQS_ENDPOINT),
            aws_lambda_endpoint: get(AWS_LAMBDA_ENDPOINT),
        };

        if config.health_check_interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                name: HEALTH_CHECK_INTERVAL_SECONDS,
                value: "0".to_string(),
            });
        }
        if config.restart_backoff_ms == 0 {
            return Err(ConfigError::Invalid {
                name: RESTART_BACKOFF_MS,
                value: "0".to_string(),
            });
        }
        if config.restart_backoff_max_ms < config.restart_backoff_ms {
            return Err(ConfigError::Invalid {
                name: RESTART_BACKOFF_MAX_MS,
                value: config.restart_backoff_max_ms.to_string(),
            });
        }

        Ok(config)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }

    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            prefetch_count: self.rabbit_prefetch_count,
            connect_timeout: Duration::from_secs(self.rabbit_connect_timeout_seconds),
        }
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            check_timeout: Duration::from_millis(self.health_check_timeout_ms),
            initial_backoff: Duration::from_millis(self.restart_backoff_ms),
            max_backoff: Duration::from_millis(self.restart_backoff_max_ms),
            ..SupervisorSettings::default()
        }
    }

    pub fn aws_settings(&self) -> AwsSettings {
        AwsSettings {
            region: self.aws_region.clone(),
            sns_endpoint: self.aws_sns_endpoint.clone(),
            sqs_endpoint: self.aws_sqs_endpoint.clone(),
            lambda_endpoint: self.aws_lambda_endpoint.clone(),
        }
    }
}

fn parse_or<T, D>(name: &'static str, value: Option<String>, default: D) -> Result<T, ConfigError>
where
    T: FromStr,
    D: FnOnce() -> T,
{
    match value {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default()),
    }
}
