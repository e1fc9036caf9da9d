use std::time::{Duration, Instant};

use log::debug;
use serde::Deserialize;

use super::ApiError;
use crate::config::{Credentials, Settings};

const GRANT_TYPE: &str = "agency_auth";
const SCOPE: &str = "openid HCHB.api.scope agency.identity hchb.identity";

/// Tokens are re-fetched after this long.
const TOKEN_MAX_AGE: Duration = Duration::from_secs(3000);
/// ...or after being handed out this many times.
const TOKEN_MAX_USES: u32 = 100;

/// Something that can hand out a bearer token for API requests.
pub trait TokenSource {
    fn token(&mut self) -> Result<String, ApiError>;
}

/// A fixed token supplied by the caller.
#[derive(Debug)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenSource for StaticToken {
    fn token(&mut self) -> Result<String, ApiError> {
        Ok(self.0.clone())
    }
}

/// Response from the token endpoint.
#[derive(Deserialize, Debug)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Error response from the token endpoint.
#[derive(Deserialize, Debug)]
struct TokenError {
    error: String,
    error_description: Option<String>,
}

/// Exchanges agency credentials for bearer tokens and caches the result.
pub struct AgencyTokenManager {
    credentials: Credentials,
    client: reqwest::blocking::Client,
    token: Option<String>,
    fetched_at: Option<Instant>,
    uses: u32,
}

impl AgencyTokenManager {
    pub fn new(credentials: Credentials, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            client,
            token: None,
            fetched_at: None,
            uses: 0,
        })
    }

    fn needs_refresh(&self) -> bool {
        match (&self.token, self.fetched_at) {
            (Some(_), Some(at)) => at.elapsed() > TOKEN_MAX_AGE || self.uses >= TOKEN_MAX_USES,
            _ => true,
        }
    }

    fn fetch_new_token(&self) -> Result<String, ApiError> {
        let creds = &self.credentials;
        let params = [
            ("grant_type", GRANT_TYPE),
            ("client_id", creds.client_id.as_str()),
            ("scope", SCOPE),
            ("resource_security_id", creds.resource_security_id.as_str()),
            ("agency_secret", creds.agency_secret.as_str()),
        ];

        debug!("POST {} (grant_type={})", creds.token_url, GRANT_TYPE);
        let start = Instant::now();
        let response = self
            .client
            .post(&creds.token_url)
            .form(&params)
            .send()
            .map_err(|e| ApiError::Auth(format!("token request failed: {}", e)))?;

        let status = response.status();
        debug!("  token response: {} in {:?}", status, start.elapsed());
        let body = response
            .text()
            .map_err(|e| ApiError::Auth(format!("failed to read token response: {}", e)))?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<TokenError>(&body) {
                let msg = err.error_description.unwrap_or_else(|| err.error.clone());
                return Err(ApiError::Auth(format!("HTTP {}: {}", status, msg)));
            }
            return Err(ApiError::Auth(format!("HTTP {}: {}", status, body)));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::Auth(format!("failed to parse token response: {}", e)))?;

        match parsed.access_token {
            Some(token) if !token.is_empty() => {
                debug!("  obtained access token ({} chars)", token.len());
                Ok(token)
            }
            _ => Err(ApiError::Auth("token response has no access_token".to_string())),
        }
    }
}

impl TokenSource for AgencyTokenManager {
    fn token(&mut self) -> Result<String, ApiError> {
        if self.needs_refresh() {
            let token = self.fetch_new_token()?;
            self.token = Some(token);
            self.fetched_at = Some(Instant::now());
            self.uses = 0;
        }
        self.uses += 1;
        self.token
            .clone()
            .ok_or_else(|| ApiError::Auth("no access token available".to_string()))
    }
}

/// Pick the token source: the `--token` override if given, otherwise the agency
/// credentials from the environment.
pub fn resolve_token_source(
    override_token: Option<&str>,
    settings: &Settings,
) -> anyhow::Result<Box<dyn TokenSource>> {
    match override_token {
        Some(token) if token.is_empty() => {
            anyhow::bail!("Provided --token value is empty")
        }
        Some(token) => {
            debug!("Using provided --token override ({} chars)", token.len());
            Ok(Box::new(StaticToken::new(token)))
        }
        None => {
            let credentials = settings.credentials()?;
            Ok(Box::new(AgencyTokenManager::new(
                credentials,
                settings.request.timeout,
            )?))
        }
    }
}
