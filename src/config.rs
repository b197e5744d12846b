//! INI file configuration.
//!
//! Loads a `[delivery]` and a `[reachability]` section into a
//! [`DeliveryClientBuilder`] and [`ReachabilitySettings`]. Both sections are
//! optional; unknown sections and keys are rejected so typos do not go
//! unnoticed.
//!
//! ```
//! use logship::config::LogshipConfig;
//!
//! let config = LogshipConfig::from_ini_str(
//!     "[delivery]\nendpoint = https://logs.example.com/\nindex = tok123\n",
//! )
//! .unwrap();
//! let settings = config.delivery().build_config().unwrap();
//! assert_eq!(settings.index, "tok123");
//! ```

use std::{fs, io, path::Path, str::FromStr, sync::Arc, time::Duration};

use ini::Ini;
use thiserror::Error;

use crate::{
    delivery::DeliveryClientBuilder,
    reachability::{
        DEFAULT_POLL_INTERVAL, FlagSource, ReachabilityMonitor, ReachabilityPolicy,
        SysfsFlagSource,
    },
};

const DELIVERY_SECTION: &str = "delivery";
const REACHABILITY_SECTION: &str = "reachability";

/// Errors raised while loading an INI configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    /// The contents are not valid INI.
    #[error("invalid INI: {0}")]
    Parse(#[from] ini::ParseError),
    /// A section other than `[delivery]` or `[reachability]`.
    #[error("unknown section [{0}]")]
    UnknownSection(String),
    /// A key not recognised within its section.
    #[error("unknown key {key:?} in [{section}]")]
    UnknownKey { section: String, key: String },
    /// A recognised key with a value that does not parse.
    #[error("invalid value {value:?} for {section}.{key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// Reachability settings read from the `[reachability]` section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReachabilitySettings {
    pub policy: ReachabilityPolicy,
    pub poll_interval: Duration,
}

impl Default for ReachabilitySettings {
    fn default() -> Self {
        Self {
            policy: ReachabilityPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ReachabilitySettings {
    /// Sysfs source polling at the configured interval.
    pub fn sysfs_source(&self) -> SysfsFlagSource {
        SysfsFlagSource::system(self.poll_interval)
    }

    /// Monitor over `source` using the configured policy.
    pub fn monitor(&self, source: Arc<dyn FlagSource>) -> ReachabilityMonitor {
        ReachabilityMonitor::with_policy(source, self.policy)
    }
}

/// Parsed configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogshipConfig {
    delivery: DeliveryClientBuilder,
    reachability: ReachabilitySettings,
}

impl LogshipConfig {
    pub fn from_ini_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ini_str(&text)
    }

    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text)?;
        let mut config = Self::default();
        for (section, props) in ini.iter() {
            match section {
                None => {
                    if let Some((key, _)) = props.iter().next() {
                        return Err(ConfigError::UnknownKey {
                            section: String::new(),
                            key: key.to_string(),
                        });
                    }
                }
                Some(DELIVERY_SECTION) => {
                    for (key, value) in props.iter() {
                        config.delivery = apply_delivery(config.delivery, key, value)?;
                    }
                }
                Some(REACHABILITY_SECTION) => {
                    for (key, value) in props.iter() {
                        apply_reachability(&mut config.reachability, key, value)?;
                    }
                }
                Some(other) => return Err(ConfigError::UnknownSection(other.to_string())),
            }
        }
        Ok(config)
    }

    /// Builder seeded from `[delivery]`. Validation happens on build.
    pub fn delivery(&self) -> DeliveryClientBuilder {
        self.delivery.clone()
    }

    pub fn reachability(&self) -> ReachabilitySettings {
        self.reachability
    }
}

fn apply_delivery(
    builder: DeliveryClientBuilder,
    key: &str,
    value: &str,
) -> Result<DeliveryClientBuilder, ConfigError> {
    let section = DELIVERY_SECTION;
    Ok(match key {
        "endpoint" => builder.with_endpoint(value.trim()),
        "index" => builder.with_index(value.trim()),
        "connect_timeout_ms" => {
            builder.with_connect_timeout_ms(parse_number(section, key, value)?)
        }
        "resource_timeout_ms" => {
            builder.with_resource_timeout_ms(parse_number(section, key, value)?)
        }
        "warn_interval_ms" => builder.with_warn_interval_ms(parse_number(section, key, value)?),
        "io_threads" => builder.with_io_threads(parse_number(section, key, value)?),
        "capacity" => builder.with_capacity(parse_number(section, key, value)?),
        _ => return Err(unknown_key(DELIVERY_SECTION, key)),
    })
}

fn apply_reachability(
    settings: &mut ReachabilitySettings,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    match key {
        "allow_cellular" => {
            settings.policy.allow_cellular = parse_bool(REACHABILITY_SECTION, key, value)?;
        }
        "poll_interval_ms" => {
            let millis: u64 = parse_number(REACHABILITY_SECTION, key, value)?;
            if millis == 0 {
                return Err(invalid(
                    REACHABILITY_SECTION,
                    key,
                    value,
                    "must be greater than zero",
                ));
            }
            settings.poll_interval = Duration::from_millis(millis);
        }
        _ => return Err(unknown_key(REACHABILITY_SECTION, key)),
    }
    Ok(())
}

fn parse_number<T>(section: &str, key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err: T::Err| invalid(section, key, value, &err.to_string()))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value, "expected a boolean")),
    }
}

fn unknown_key(section: &str, key: &str) -> ConfigError {
    ConfigError::UnknownKey {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
