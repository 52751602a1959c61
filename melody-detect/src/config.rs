//! Configuration for melody-detect
//!
//! Resolution priority per setting: CLI → ENV → TOML → built-in defaults.
//! CLI flags are applied in `main`; this module covers the TOML file and the
//! environment overrides, and turns the provider sections into a
//! [`ProviderRegistry`].

use melody_common::config::{env_value, is_valid_key, load_toml_config, resolve_config_path, LoggingConfig};
use melody_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::providers::aiornot::{self, AiOrNotClient};
use crate::providers::hive::{self, HiveAuth, HiveClient};
use crate::providers::http::{HttpSettings, ProviderHttp};
use crate::providers::ircam::{self, IrcamClient, IrcamEndpoints};
use crate::providers::shlabs::{self, ShLabsAuth, ShLabsClient};
use crate::providers::sightengine::{self, SightengineAuth, SightengineClient};
use crate::providers::{PollPolicy, ProviderRegistry, DEFAULT_POLL_INTERVAL};
use crate::services::TokenCache;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MELODY_CONFIG";

/// Config file name under `~/.config/melody/`
pub const CONFIG_FILE_NAME: &str = "melody-detect.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub jobs: JobsConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Largest accepted upload, in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Requests older than this are evicted
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
    /// Broadcast buffer for detection events
    pub event_capacity: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: 3600,
            sweep_interval_secs: 60,
            event_capacity: 256,
        }
    }
}

impl JobsConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Client tuning shared by every provider section
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientTuning {
    pub request_timeout_secs: u64,
    /// Outbound request budget; unset means unlimited
    pub requests_per_second: Option<u32>,
}

impl Default for ClientTuning {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
            requests_per_second: None,
        }
    }
}

impl ClientTuning {
    fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            requests_per_second: self.requests_per_second.and_then(NonZeroU32::new),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub aiornot: AiOrNotConfig,
    pub hive: HiveConfig,
    pub shlabs: ShLabsConfig,
    pub sightengine: SightengineConfig,
    pub ircam: IrcamConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AiOrNotConfig {
    pub enabled: bool,
    pub api_url: String,
    pub api_key: Option<String>,
    #[serde(flatten)]
    pub client: ClientTuning,
}

impl Default for AiOrNotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: aiornot::DEFAULT_API_URL.to_string(),
            api_key: None,
            client: ClientTuning::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HiveConfig {
    pub enabled: bool,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    /// Full `Authorization` header value; takes precedence over `api_key`
    pub auth_header: Option<String>,
    #[serde(flatten)]
    pub client: ClientTuning,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: None,
            api_key: None,
            auth_header: None,
            client: ClientTuning::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShLabsConfig {
    pub enabled: bool,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    /// Full `Authorization` header value; takes precedence over `api_key`
    pub auth_header: Option<String>,
    #[serde(flatten)]
    pub client: ClientTuning,
}

impl Default for ShLabsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: None,
            api_key: None,
            auth_header: None,
            client: ClientTuning::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SightengineConfig {
    pub enabled: bool,
    pub api_url: Option<String>,
    pub api_user: Option<String>,
    pub api_secret: Option<String>,
    /// Bearer key, used only when user/secret are not both set
    pub api_key: Option<String>,
    #[serde(flatten)]
    pub client: ClientTuning,
}

impl Default for SightengineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: None,
            api_user: None,
            api_secret: None,
            api_key: None,
            client: ClientTuning::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IrcamConfig {
    pub enabled: bool,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub auth_url: String,
    pub api_base_url: String,
    pub storage_base_url: String,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    #[serde(flatten)]
    pub client: ClientTuning,
}

impl Default for IrcamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            client_id: None,
            client_secret: None,
            auth_url: ircam::DEFAULT_AUTH_URL.to_string(),
            api_base_url: ircam::DEFAULT_API_BASE_URL.to_string(),
            storage_base_url: ircam::DEFAULT_STORAGE_BASE_URL.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            max_attempts: ircam::DEFAULT_MAX_ATTEMPTS,
            client: ClientTuning::default(),
        }
    }
}

impl IrcamConfig {
    /// Zero interval and zero attempts are raised to one
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            max_attempts: self.max_attempts.max(1),
        }
    }
}

/// Non-blank credential value
fn credential(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| is_valid_key(v))
}

fn override_from_env(target: &mut Option<String>, name: &str) {
    if let Some(value) = env_value(name) {
        *target = Some(value);
    }
}

fn override_string_from_env(target: &mut String, name: &str) {
    if let Some(value) = env_value(name) {
        *target = value;
    }
}

fn provider_http(provider: &'static str, tuning: &ClientTuning) -> Result<ProviderHttp> {
    ProviderHttp::new(provider, tuning.http_settings())
        .map_err(|e| Error::Config(format!("HTTP client for {}: {}", provider, e)))
}

impl DetectConfig {
    /// Locate and parse the TOML file, then apply environment overrides
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR, CONFIG_FILE_NAME);
        let mut config: DetectConfig = load_toml_config(path.as_deref())?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Overlay provider endpoints, credentials and `PORT` from the environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        let p = &mut self.providers;

        override_string_from_env(&mut p.aiornot.api_url, "AIORNOT_API_URL");
        override_from_env(&mut p.aiornot.api_key, "AIORNOT_API_KEY");

        override_from_env(&mut p.hive.api_url, "HIVE_API_URL");
        override_from_env(&mut p.hive.api_key, "HIVE_API_KEY");
        override_from_env(&mut p.hive.auth_header, "HIVE_AUTH_HEADER");

        override_from_env(&mut p.shlabs.api_url, "SHLABS_API_URL");
        override_from_env(&mut p.shlabs.api_key, "SHLABS_API_KEY");
        override_from_env(&mut p.shlabs.auth_header, "SHLABS_AUTH_HEADER");

        override_from_env(&mut p.sightengine.api_url, "SE_API_URL");
        override_from_env(&mut p.sightengine.api_user, "SE_API_USER");
        override_from_env(&mut p.sightengine.api_secret, "SE_API_SECRET");
        override_from_env(&mut p.sightengine.api_key, "SE_API_KEY");

        override_from_env(&mut p.ircam.client_id, "IRCAM_CLIENT_ID");
        override_from_env(&mut p.ircam.client_secret, "IRCAM_CLIENT_SECRET");
        override_string_from_env(&mut p.ircam.auth_url, "IRCAM_AUTH_URL");
        override_string_from_env(&mut p.ircam.api_base_url, "IRCAM_API_BASE_URL");
        override_string_from_env(&mut p.ircam.storage_base_url, "IRCAM_STORAGE_BASE_URL");

        if let Some(port) = env_value("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| Error::Config(format!("PORT is not a valid port number: {}", port)))?;
        }

        Ok(())
    }

    /// Build adapters for every enabled provider with usable credentials
    ///
    /// Providers lacking credentials are skipped with a warning; malformed
    /// endpoint URLs are a configuration error.
    pub fn build_registry(&self, tokens: Arc<TokenCache>) -> Result<ProviderRegistry> {
        let p = &self.providers;
        let mut registry = ProviderRegistry::new();

        if p.aiornot.enabled {
            match credential(&p.aiornot.api_key) {
                Some(key) => registry.register(Arc::new(AiOrNotClient::new(
                    provider_http(aiornot::PROVIDER_ID, &p.aiornot.client)?,
                    p.aiornot.api_url.clone(),
                    key,
                ))),
                None => warn!("AI or Not disabled: AIORNOT_API_KEY not configured"),
            }
        }

        if p.hive.enabled {
            let auth = credential(&p.hive.auth_header)
                .map(|h| HiveAuth::RawHeader(h.to_string()))
                .or_else(|| credential(&p.hive.api_key).map(|k| HiveAuth::Bearer(k.to_string())));
            match (credential(&p.hive.api_url), auth) {
                (Some(url), Some(auth)) => registry.register(Arc::new(HiveClient::new(
                    provider_http(hive::PROVIDER_ID, &p.hive.client)?,
                    url,
                    auth,
                ))),
                _ => warn!("Hive disabled: HIVE_API_URL and HIVE_API_KEY (or HIVE_AUTH_HEADER) required"),
            }
        }

        if p.shlabs.enabled {
            let auth = credential(&p.shlabs.auth_header)
                .map(|h| ShLabsAuth::RawHeader(h.to_string()))
                .or_else(|| credential(&p.shlabs.api_key).map(|k| ShLabsAuth::ApiKey(k.to_string())));
            match (credential(&p.shlabs.api_url), auth) {
                (Some(url), Some(auth)) => registry.register(Arc::new(ShLabsClient::new(
                    provider_http(shlabs::PROVIDER_ID, &p.shlabs.client)?,
                    url,
                    auth,
                ))),
                _ => warn!("SH Labs disabled: SHLABS_API_URL and SHLABS_API_KEY (or SHLABS_AUTH_HEADER) required"),
            }
        }

        if p.sightengine.enabled {
            let se = &p.sightengine;
            let auth = match (credential(&se.api_user), credential(&se.api_secret)) {
                (Some(user), Some(secret)) => Some(SightengineAuth::UserSecret {
                    api_user: user.to_string(),
                    api_secret: secret.to_string(),
                }),
                _ => credential(&se.api_key).map(|k| SightengineAuth::Bearer(k.to_string())),
            };
            match (credential(&se.api_url), auth) {
                (Some(url), Some(auth)) => registry.register(Arc::new(SightengineClient::new(
                    provider_http(sightengine::PROVIDER_ID, &se.client)?,
                    url,
                    auth,
                ))),
                _ => warn!("Sightengine disabled: SE_API_URL and SE_API_USER/SE_API_SECRET (or SE_API_KEY) required"),
            }
        }

        if p.ircam.enabled {
            let ic = &p.ircam;
            match (credential(&ic.client_id), credential(&ic.client_secret)) {
                (Some(client_id), Some(client_secret)) => {
                    let endpoints = IrcamEndpoints::parse(&ic.auth_url, &ic.api_base_url, &ic.storage_base_url)?;
                    registry.register(Arc::new(IrcamClient::new(
                        provider_http(ircam::PROVIDER_ID, &ic.client)?,
                        endpoints,
                        client_id,
                        client_secret,
                        tokens,
                        ic.poll_policy(),
                    )));
                }
                _ => warn!("IRCAM disabled: IRCAM_CLIENT_ID and IRCAM_CLIENT_SECRET required"),
            }
        }

        if registry.is_empty() {
            warn!("No detection providers configured; submissions will be rejected");
        } else {
            info!(providers = ?registry.ids(), "Detection providers ready");
        }

        Ok(registry)
    }
}
