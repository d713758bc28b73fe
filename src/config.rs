use std::time::Duration;

use camino::Utf8PathBuf;

use crate::domain::{MappingFormat, SourcePattern, UrlTemplate};
use crate::error::LoaderError;
use crate::retry::RetryPolicy;

pub const DEFAULT_REGISTRY_URL: &str = "https://wwwdev.ebi.ac.uk/ena/registry/metagenome/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_SUBMIT_DELAY_MS: u64 = 1000;

/// Raw settings as found in the environment, before validation.
#[derive(Debug, Default, Clone)]
pub struct Config {
    pub broker_id: Option<String>,
    pub authorisation_token: Option<String>,
    pub source_endpoint: Option<String>,
    pub source_pattern: Option<String>,
    pub public_check_endpoint: Option<String>,
    pub mappings_download: Option<String>,
    pub mappings_local: Option<String>,
    pub mappings_format: Option<String>,
    pub mappings_header: Option<String>,
    pub source_id_column: Option<String>,
    pub insdc_id_column: Option<String>,
    pub methods: Option<String>,
    pub confidence: Option<String>,
    pub registry_url: Option<String>,
    pub http_timeout_secs: Option<String>,
    pub retry_attempts: Option<String>,
    pub retry_delay_ms: Option<String>,
    pub submit_delay_ms: Option<String>,
}

impl Config {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            broker_id: lookup("BROKER_ID"),
            authorisation_token: lookup("AUTHORISATION_TOKEN"),
            source_endpoint: lookup("SOURCE_ENDPOINT"),
            source_pattern: lookup("SOURCE_PATTERN"),
            public_check_endpoint: lookup("PUBLIC_CHECK_ENDPOINT"),
            mappings_download: lookup("MAPPINGS_DOWNLOAD"),
            mappings_local: lookup("MAPPINGS_LOCAL"),
            mappings_format: lookup("MAPPINGS_FORMAT"),
            mappings_header: lookup("MAPPINGS_HEADER"),
            source_id_column: lookup("SOURCE_ID_COLUMN"),
            insdc_id_column: lookup("INSDC_ID_COLUMN"),
            methods: lookup("METHODS"),
            confidence: lookup("CONFIDENCE"),
            registry_url: lookup("MGX_REGISTRY_URL"),
            http_timeout_secs: lookup("HTTP_TIMEOUT_SECS"),
            retry_attempts: lookup("RETRY_ATTEMPTS"),
            retry_delay_ms: lookup("RETRY_DELAY_MS"),
            submit_delay_ms: lookup("SUBMIT_DELAY_MS"),
        }
    }
}

/// Who is submitting and what every record carries.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub broker_id: String,
    pub authorisation_token: String,
    pub source_endpoint: UrlTemplate,
    pub source_pattern: SourcePattern,
    pub public_check: Option<UrlTemplate>,
    pub methods: Vec<String>,
    pub confidence: String,
}

#[derive(Debug, Clone)]
pub struct MappingSettings {
    pub download_url: String,
    pub local_path: Utf8PathBuf,
    pub format: MappingFormat,
    pub has_header: bool,
    pub source_column: usize,
    pub insdc_column: usize,
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub registry_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub submit_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub mappings: MappingSettings,
    pub http: HttpSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn from_env() -> Result<Settings, LoaderError> {
        Self::resolve_config(Config::from_lookup(|key| std::env::var(key).ok()))
    }

    pub fn resolve_config(config: Config) -> Result<Settings, LoaderError> {
        let broker = BrokerSettings {
            broker_id: required("BROKER_ID", config.broker_id)?,
            authorisation_token: required("AUTHORISATION_TOKEN", config.authorisation_token)?,
            source_endpoint: UrlTemplate::new(required(
                "SOURCE_ENDPOINT",
                config.source_endpoint,
            )?),
            source_pattern: SourcePattern::new(&required("SOURCE_PATTERN", config.source_pattern)?)?,
            public_check: config
                .public_check_endpoint
                .filter(|value| !value.trim().is_empty())
                .map(UrlTemplate::new),
            methods: parse_list(&required("METHODS", config.methods)?),
            confidence: required("CONFIDENCE", config.confidence)?,
        };

        let mappings = MappingSettings {
            download_url: required("MAPPINGS_DOWNLOAD", config.mappings_download)?,
            local_path: Utf8PathBuf::from(required("MAPPINGS_LOCAL", config.mappings_local)?),
            format: match config.mappings_format {
                Some(value) => value.parse()?,
                None => MappingFormat::Tsv,
            },
            has_header: parse_bool(
                "MAPPINGS_HEADER",
                &required("MAPPINGS_HEADER", config.mappings_header)?,
            )?,
            source_column: parse_number(
                "SOURCE_ID_COLUMN",
                &required("SOURCE_ID_COLUMN", config.source_id_column)?,
            )?,
            insdc_column: parse_number(
                "INSDC_ID_COLUMN",
                &required("INSDC_ID_COLUMN", config.insdc_id_column)?,
            )?,
        };

        let retry_attempts = optional_number("RETRY_ATTEMPTS", config.retry_attempts)?
            .unwrap_or(crate::retry::DEFAULT_MAX_ATTEMPTS);
        if retry_attempts == 0 {
            return Err(LoaderError::InvalidSetting {
                key: "RETRY_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        let retry_delay = optional_number("RETRY_DELAY_MS", config.retry_delay_ms)?
            .unwrap_or(DEFAULT_RETRY_DELAY_MS);
        let http = HttpSettings {
            registry_url: config
                .registry_url
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(
                optional_number("HTTP_TIMEOUT_SECS", config.http_timeout_secs)?
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            retry: RetryPolicy::new(retry_attempts, Duration::from_millis(retry_delay)),
            submit_delay: Duration::from_millis(
                optional_number("SUBMIT_DELAY_MS", config.submit_delay_ms)?
                    .unwrap_or(DEFAULT_SUBMIT_DELAY_MS),
            ),
        };

        Ok(Settings {
            broker,
            mappings,
            http,
        })
    }
}

fn required(key: &str, value: Option<String>) -> Result<String, LoaderError> {
    value.ok_or_else(|| LoaderError::MissingSetting(key.to_string()))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, LoaderError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err: T::Err| LoaderError::InvalidSetting {
            key: key.to_string(),
            message: format!("{value:?}: {err}"),
        })
}

fn optional_number<T: std::str::FromStr>(
    key: &str,
    value: Option<String>,
) -> Result<Option<T>, LoaderError>
where
    T::Err: std::fmt::Display,
{
    match value.filter(|value| !value.trim().is_empty()) {
        Some(value) => parse_number(key, &value).map(Some),
        None => Ok(None),
    }
}

pub fn parse_bool(key: &str, value: &str) -> Result<bool, LoaderError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "y" | "t" | "1" => Ok(true),
        "false" | "no" | "off" | "n" | "f" | "0" | "" => Ok(false),
        _ => Err(LoaderError::InvalidSetting {
            key: key.to_string(),
            message: format!("{value:?} is not a boolean"),
        }),
    }
}

pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_values() {
        assert!(parse_bool("K", "True").unwrap());
        assert!(parse_bool("K", "1").unwrap());
        assert!(!parse_bool("K", "off").unwrap());
        assert!(!parse_bool("K", "").unwrap());
        assert!(parse_bool("K", "maybe").is_err());
    }

    #[test]
    fn parse_method_list() {
        assert_eq!(
            parse_list("other_metadata, experimental_evidence,,"),
            vec!["other_metadata", "experimental_evidence"]
        );
    }
}
