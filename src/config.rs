//! Environment-backed configuration.
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file in the working directory. Request defaults fall back to the values the
//! HCHB API is normally queried with.

use std::path::PathBuf;
use std::time::Duration;

use log::debug;
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_PAGES: u32 = 1;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_ACTIVE: bool = true;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}. Set it in the environment or in a .env file.")]
    Missing(&'static str),

    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Defaults applied to every search request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDefaults {
    pub page_size: u32,
    /// `None` means follow "next" links until the server stops sending them.
    pub max_pages: Option<u32>,
    pub timeout: Duration,
    pub active: bool,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: Some(DEFAULT_MAX_PAGES),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            active: DEFAULT_ACTIVE,
        }
    }
}

/// Agency credentials exchanged for a bearer token.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub client_id: String,
    pub resource_security_id: String,
    pub agency_secret: String,
    pub token_url: String,
}

// Keep the secret out of debug logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("resource_security_id", &self.resource_security_id)
            .field("agency_secret", &"<redacted>")
            .field("token_url", &self.token_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    api_base_url: Option<String>,
    pub request: RequestDefaults,
    pub export_json: bool,
    pub output_dir: Option<PathBuf>,
    client_id: Option<String>,
    resource_security_id: Option<String>,
    agency_secret: Option<String>,
    token_url: Option<String>,
}

impl Settings {
    /// Load settings from the process environment. Call [`load_dotenv`] first
    /// to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_base_url =
            get("HCHB_API_BASE_URL").map(|url| url.trim_end_matches('/').to_string());

        let mut request = RequestDefaults::default();
        if let Some(v) = get("HCHB_PAGE_SIZE") {
            request.page_size = parse_number("HCHB_PAGE_SIZE", &v)?;
            if request.page_size == 0 {
                return Err(ConfigError::Invalid {
                    var: "HCHB_PAGE_SIZE",
                    value: v,
                });
            }
        }
        if let Some(v) = get("HCHB_MAX_PAGES") {
            request.max_pages = max_pages_limit(parse_number("HCHB_MAX_PAGES", &v)?);
        }
        if let Some(v) = get("HCHB_TIMEOUT_SECS") {
            let secs: u64 = parse_number("HCHB_TIMEOUT_SECS", &v)?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    var: "HCHB_TIMEOUT_SECS",
                    value: v,
                });
            }
            request.timeout = Duration::from_secs(secs);
        }
        if let Some(v) = get("HCHB_ACTIVE") {
            request.active = parse_bool("HCHB_ACTIVE", &v)?;
        }

        let export_json = match get("EXPORT_JSON") {
            Some(v) => parse_bool("EXPORT_JSON", &v)?,
            None => true,
        };

        let settings = Settings {
            api_base_url,
            request,
            export_json,
            output_dir: get("HCHB_OUTPUT_DIR").map(PathBuf::from),
            client_id: get("HCHB_CLIENT_ID"),
            resource_security_id: get("HCHB_RESOURCE_SECURITY_ID"),
            agency_secret: get("HCHB_AGENCY_SECRET"),
            token_url: get("HCHB_TOKEN_URL"),
        };
        debug!(
            "Loaded settings: base_url={:?} page_size={} max_pages={:?} timeout={:?} active={}",
            settings.api_base_url,
            settings.request.page_size,
            settings.request.max_pages,
            settings.request.timeout,
            settings.request.active
        );
        Ok(settings)
    }

    /// FHIR base URL, without a trailing slash. Only needed for API calls.
    pub fn api_base_url(&self) -> Result<&str, ConfigError> {
        self.api_base_url
            .as_deref()
            .ok_or(ConfigError::Missing("HCHB_API_BASE_URL"))
    }

    /// Agency credentials. Only needed when no `--token` override is given.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        fn require(value: &Option<String>, var: &'static str) -> Result<String, ConfigError> {
            value.clone().ok_or(ConfigError::Missing(var))
        }

        Ok(Credentials {
            client_id: require(&self.client_id, "HCHB_CLIENT_ID")?,
            resource_security_id: require(&self.resource_security_id, "HCHB_RESOURCE_SECURITY_ID")?,
            agency_secret: require(&self.agency_secret, "HCHB_AGENCY_SECRET")?,
            token_url: require(&self.token_url, "HCHB_TOKEN_URL")?,
        })
    }
}

/// Translate a page-limit setting into a limit: 0 means unlimited.
pub fn max_pages_limit(value: u32) -> Option<u32> {
    (value > 0).then_some(value)
}

/// Seed the process environment from `.env` in the working directory.
/// A missing file is not an error.
pub fn load_dotenv() -> Result<(), dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(ref e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        }),
    }
}
