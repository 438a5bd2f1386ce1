//! Runtime configuration loaded from the process environment.
//!
//! Every command except schema initialization needs the full [`AppConfig`];
//! `init-db` only resolves the store location through [`resolve_db_path`].

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_DB_PATH: &str = "data/abcp_b24.sqlite3";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Fully validated configuration for import and reconciliation commands.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub http: HttpSettings,
    pub db_path: PathBuf,
    pub sync_interval: Duration,
}

/// ABCP `/cp/users` endpoint settings.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub base_url: String,
    pub user_login: String,
    pub user_password: String,
    pub page_size: u32,
    pub max_pages: Option<u32>,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SourceConfig")
            .field("base_url", &self.base_url)
            .field("user_login", &self.user_login)
            .field("user_password", &"[REDACTED]")
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

/// Bitrix24 webhook and deal pipeline settings.
#[derive(Clone, PartialEq, Eq)]
pub struct DestinationConfig {
    pub webhook_url: String,
    pub deal_title_prefix: String,
    pub deal_category_id: i64,
    pub deal_stage_id: String,
    pub fields: CustomFieldKeys,
}

impl fmt::Debug for DestinationConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DestinationConfig")
            .field("webhook_url", &describe_webhook(&self.webhook_url))
            .field("deal_title_prefix", &self.deal_title_prefix)
            .field("deal_category_id", &self.deal_category_id)
            .field("deal_stage_id", &self.deal_stage_id)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Custom (`UF_*`) field keys written on destination entities.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomFieldKeys {
    pub deal_user_id: String,
    pub deal_inn: String,
    pub deal_balance: String,
    pub deal_registration_date: Option<String>,
    pub deal_update_time: Option<String>,
    pub contact_inn: Option<String>,
}

impl Default for CustomFieldKeys {
    fn default() -> Self {
        Self {
            deal_user_id: "UF_CRM_1738181468".to_string(),
            deal_inn: "UF_CRM_1713393074421".to_string(),
            deal_balance: "UF_CRM_1738182431".to_string(),
            deal_registration_date: Some("UF_CRM_1759089715".to_string()),
            deal_update_time: Some("UF_CRM_1738256915999".to_string()),
            contact_inn: None,
        }
    }
}

/// Timeout, retry and pacing policy shared by both HTTP clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HttpSettings {
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retries: u32,
    /// Delay before retry `n` is `retry_backoff * n`.
    pub retry_backoff: Duration,
    /// Pause after every successful call.
    pub pacing: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            retries: 3,
            retry_backoff: Duration::from_millis(1_500),
            pacing: Duration::from_millis(200),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = required_trimmed(&lookup, "ABCP_BASE_URL")?;
        if !is_http_url(&base_url) {
            return Err(ConfigError::Invalid(
                "ABCP_BASE_URL must start with http:// or https://".to_string(),
            ));
        }
        let user_login = required_trimmed(&lookup, "ABCP_USERLOGIN")?;
        let user_password = required_trimmed(&lookup, "ABCP_USERPSW")?;

        let page_size = parse_u32(&lookup, "ABCP_LIMIT", 500)?;
        if !(1..=5_000).contains(&page_size) {
            return Err(ConfigError::Invalid(
                "ABCP_LIMIT must be in [1, 5000]".to_string(),
            ));
        }
        let max_pages = optional_trimmed(&lookup, "ABCP_MAX_PAGES")
            .map(|value| match value.parse::<u32>() {
                Ok(pages) if pages > 0 => Ok(pages),
                _ => Err(ConfigError::Invalid(
                    "ABCP_MAX_PAGES must be a positive integer".to_string(),
                )),
            })
            .transpose()?;

        let webhook_url = required_trimmed(&lookup, "B24_WEBHOOK_URL")?;
        if !is_http_url(&webhook_url) {
            return Err(ConfigError::Invalid(
                "B24_WEBHOOK_URL must start with http:// or https://".to_string(),
            ));
        }
        let deal_title_prefix = lookup("B24_DEAL_TITLE_PREFIX")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "Client #".to_string());
        let deal_category_id = required_trimmed(&lookup, "B24_DEAL_CATEGORY_ID_USERS")?
            .parse::<i64>()
            .map_err(|_| {
                ConfigError::Invalid("B24_DEAL_CATEGORY_ID_USERS must be an integer".to_string())
            })?;
        let deal_stage_id = required_trimmed(&lookup, "B24_DEAL_STAGE_NEW_USERS")?;

        let defaults = CustomFieldKeys::default();
        let fields = CustomFieldKeys {
            deal_user_id: value_or_default(
                &lookup,
                "UF_B24_DEAL_ABCP_USER_ID",
                &defaults.deal_user_id,
            ),
            deal_inn: value_or_default(&lookup, "UF_B24_DEAL_INN", &defaults.deal_inn),
            deal_balance: value_or_default(&lookup, "UF_B24_DEAL_SALDO", &defaults.deal_balance),
            deal_registration_date: optional_trimmed(&lookup, "UF_B24_DEAL_REG_DATE")
                .or(defaults.deal_registration_date),
            deal_update_time: optional_trimmed(&lookup, "UF_B24_DEAL_UPDATE_TIME")
                .or(defaults.deal_update_time),
            contact_inn: optional_trimmed(&lookup, "UF_B24_CONTACT_INN"),
        };

        let timeout_secs = parse_u32(&lookup, "REQUESTS_TIMEOUT", 20)?;
        if !(1..=600).contains(&timeout_secs) {
            return Err(ConfigError::Invalid(
                "REQUESTS_TIMEOUT must be in [1, 600]".to_string(),
            ));
        }
        let retries = parse_u32(&lookup, "REQUESTS_RETRIES", 3)?;
        if retries > 20 {
            return Err(ConfigError::Invalid(
                "REQUESTS_RETRIES must be in [0, 20]".to_string(),
            ));
        }
        let http_defaults = HttpSettings::default();
        let retry_backoff = parse_seconds(
            &lookup,
            "REQUESTS_RETRY_BACKOFF",
            http_defaults.retry_backoff,
        )?;
        let pacing = parse_seconds(&lookup, "RATE_LIMIT_SLEEP", http_defaults.pacing)?;

        let sync_interval_secs = parse_u32(&lookup, "SYNC_INTERVAL_SECONDS", 60)?;
        if sync_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "SYNC_INTERVAL_SECONDS must be >= 1".to_string(),
            ));
        }

        Ok(Self {
            source: SourceConfig {
                base_url,
                user_login,
                user_password,
                page_size,
                max_pages,
            },
            destination: DestinationConfig {
                webhook_url: webhook_url.trim_end_matches('/').to_string(),
                deal_title_prefix,
                deal_category_id,
                deal_stage_id,
                fields,
            },
            http: HttpSettings {
                timeout: Duration::from_secs(u64::from(timeout_secs)),
                retries,
                retry_backoff,
                pacing,
            },
            db_path: resolve_db_path(None, &lookup),
            sync_interval: Duration::from_secs(u64::from(sync_interval_secs)),
        })
    }
}

/// Resolve the store location: explicit path, then `SQLITE_PATH`, then the default.
pub fn resolve_db_path(
    explicit: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> PathBuf {
    explicit
        .or_else(|| optional_trimmed(lookup, "SQLITE_PATH").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
}

/// Describe a webhook URL without its user id and token path segments.
pub fn describe_webhook(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return "(invalid)".to_string();
    };
    let mut parts = rest.split('/').filter(|segment| !segment.is_empty());
    let host = parts.next().unwrap_or_default();
    let segments = parts.count();
    format!("{scheme}://{host}/rest/*/* (segments={segments})")
}

fn parse_u32(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u32,
) -> Result<u32, ConfigError> {
    optional_trimmed(lookup, name).map_or(Ok(default), |value| {
        value
            .parse::<u32>()
            .map_err(|_| ConfigError::Invalid(format!("{name} must be a non-negative integer")))
    })
}

fn parse_seconds(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(value) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let seconds = value
        .parse::<f64>()
        .map_err(|_| ConfigError::Invalid(format!("{name} must be a number of seconds")))?;
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| ConfigError::Invalid(format!("{name} must be a non-negative number")))
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn minimal() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("ABCP_BASE_URL", "https://abcp.example.com/cp/users"),
            ("ABCP_USERLOGIN", "api-user"),
            ("ABCP_USERPSW", "very-secret-password"),
            (
                "B24_WEBHOOK_URL",
                "https://portal.bitrix24.ru/rest/17/webhooktoken123/",
            ),
            ("B24_DEAL_CATEGORY_ID_USERS", "7"),
            ("B24_DEAL_STAGE_NEW_USERS", "C7:NEW"),
        ])
    }

    fn load(map: &HashMap<&str, &str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn config_requires_source_credentials() {
        let map: HashMap<&str, &str> = HashMap::new();
        let err = load(&map).unwrap_err();
        assert!(err.to_string().contains("ABCP_BASE_URL"));
    }

    #[test]
    fn config_requires_deal_pipeline() {
        let mut map = minimal();
        map.remove("B24_DEAL_STAGE_NEW_USERS");
        let err = load(&map).unwrap_err();
        assert!(err.to_string().contains("B24_DEAL_STAGE_NEW_USERS"));
    }

    #[test]
    fn config_applies_defaults() {
        let config = load(&minimal()).unwrap();

        assert_eq!(config.source.page_size, 500);
        assert_eq!(config.source.max_pages, None);
        assert_eq!(config.destination.deal_category_id, 7);
        assert_eq!(config.destination.deal_title_prefix, "Client #");
        assert_eq!(
            config.destination.webhook_url,
            "https://portal.bitrix24.ru/rest/17/webhooktoken123"
        );
        assert_eq!(config.destination.fields, CustomFieldKeys::default());
        assert_eq!(config.http, HttpSettings::default());
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.sync_interval, Duration::from_secs(60));
    }

    #[test]
    fn config_rejects_invalid_numbers() {
        let mut map = minimal();
        map.insert("ABCP_LIMIT", "0");
        assert!(load(&map).unwrap_err().to_string().contains("ABCP_LIMIT"));

        let mut map = minimal();
        map.insert("B24_DEAL_CATEGORY_ID_USERS", "users");
        assert!(load(&map)
            .unwrap_err()
            .to_string()
            .contains("B24_DEAL_CATEGORY_ID_USERS"));

        let mut map = minimal();
        map.insert("REQUESTS_RETRY_BACKOFF", "-1");
        assert!(load(&map)
            .unwrap_err()
            .to_string()
            .contains("REQUESTS_RETRY_BACKOFF"));
    }

    #[test]
    fn config_rejects_zero_page_cap() {
        let mut map = minimal();
        map.insert("ABCP_MAX_PAGES", "0");
        let err = load(&map).unwrap_err();
        assert!(err.to_string().contains("ABCP_MAX_PAGES"));

        map.insert("ABCP_MAX_PAGES", "-2");
        assert!(load(&map).is_err());
    }

    #[test]
    fn config_defaults_deal_date_fields() {
        let config = load(&minimal()).unwrap();
        let fields = &config.destination.fields;

        assert_eq!(
            fields.deal_registration_date.as_deref(),
            Some("UF_CRM_1759089715")
        );
        assert_eq!(
            fields.deal_update_time.as_deref(),
            Some("UF_CRM_1738256915999")
        );
        assert_eq!(fields.contact_inn, None);
    }

    #[test]
    fn config_reads_optional_fields() {
        let mut map = minimal();
        map.insert("ABCP_MAX_PAGES", "3");
        map.insert("UF_B24_DEAL_REG_DATE", "UF_CRM_REG");
        map.insert("REQUESTS_RETRY_BACKOFF", "0.5");
        map.insert("SQLITE_PATH", "/var/lib/abcp/store.db");

        let config = load(&map).unwrap();
        assert_eq!(config.source.max_pages, Some(3));
        assert_eq!(
            config.destination.fields.deal_registration_date.as_deref(),
            Some("UF_CRM_REG")
        );
        assert_eq!(config.http.retry_backoff, Duration::from_millis(500));
        assert_eq!(config.db_path, PathBuf::from("/var/lib/abcp/store.db"));
    }

    #[test]
    fn config_redacts_secrets_in_debug() {
        let config = load(&minimal()).unwrap();
        let debug_output = format!("{config:?}");

        assert!(!debug_output.contains("very-secret-password"));
        assert!(!debug_output.contains("webhooktoken123"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains("portal.bitrix24.ru"));
    }

    #[test]
    fn resolve_db_path_prefers_explicit_value() {
        let explicit = resolve_db_path(Some(PathBuf::from("/tmp/a.db")), |_| {
            Some("/tmp/b.db".to_string())
        });
        assert_eq!(explicit, PathBuf::from("/tmp/a.db"));

        let from_env = resolve_db_path(None, |_| Some(" /tmp/b.db ".to_string()));
        assert_eq!(from_env, PathBuf::from("/tmp/b.db"));
    }
}
