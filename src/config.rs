use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

// Fixed development addresses, matching the backend's local ports.
const LOCAL_API_URL: &str = "http://localhost:3005";
const LOCAL_WS_URL: &str = "ws://localhost:3005";
const LOCAL_VOICE_URL: &str = "ws://localhost:7880";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

/// Which credential route the backend exposes. Older deployments issue
/// tokens on `/api/sofia/token`, newer ones on `/api/sofia/connect`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenRoute {
    Token,
    Connect,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub voice_enabled: bool,
    pub realtime_updates: bool,
    pub demo_mode: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            voice_enabled: true,
            realtime_updates: true,
            demo_mode: false,
        }
    }
}

/// Service endpoints and feature flags, resolved once at startup and
/// immutable for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub api_base_url: String,
    pub ws_url: String,
    pub voice_url: String,
    pub environment: Environment,
    pub token_route: TokenRoute,
    pub features: FeatureFlags,
}

/// Externally supplied values. Explicit URLs always win over the
/// origin-host policy; remote origins are never hard-coded.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
    pub voice_url: Option<String>,
    pub remote_origin: Option<String>,
    pub remote_voice_origin: Option<String>,
    pub token_route: Option<String>,
    pub voice_enabled: Option<bool>,
    pub realtime_updates: Option<bool>,
    pub demo_mode: Option<bool>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self {
            api_url: env::var("FRONTDESK_API_URL").ok(),
            ws_url: env::var("FRONTDESK_WS_URL").ok(),
            voice_url: env::var("FRONTDESK_VOICE_URL").ok(),
            remote_origin: env::var("FRONTDESK_REMOTE_ORIGIN").ok(),
            remote_voice_origin: env::var("FRONTDESK_REMOTE_VOICE_ORIGIN").ok(),
            token_route: env::var("FRONTDESK_TOKEN_ROUTE").ok(),
            voice_enabled: env_flag("FRONTDESK_VOICE_ENABLED"),
            realtime_updates: env_flag("FRONTDESK_REALTIME_UPDATES"),
            demo_mode: env_flag("FRONTDESK_DEMO_MODE"),
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name).ok().and_then(|v| match v.as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    })
}

pub fn is_development_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1" | "0.0.0.0")
}

/// `https://example.com` -> `wss://example.com` (and http -> ws).
fn to_ws_origin(origin: &str) -> String {
    if let Some(rest) = origin.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = origin.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        origin.to_string()
    }
}

impl AppConfig {
    /// Resolve endpoints from the page origin host plus environment
    /// overrides. A development host gets fixed local addresses; anything
    /// else requires a configured remote origin. Missing remote
    /// configuration is an error the caller surfaces as a persistent
    /// banner, not a panic.
    pub fn resolve(origin_host: &str, overrides: &Overrides) -> Result<Self, AppError> {
        let dev = is_development_host(origin_host);

        let (api_base_url, ws_url, voice_url) = if dev {
            (
                overrides
                    .api_url
                    .clone()
                    .unwrap_or_else(|| LOCAL_API_URL.to_string()),
                overrides
                    .ws_url
                    .clone()
                    .unwrap_or_else(|| LOCAL_WS_URL.to_string()),
                overrides
                    .voice_url
                    .clone()
                    .unwrap_or_else(|| LOCAL_VOICE_URL.to_string()),
            )
        } else {
            let api = match (&overrides.api_url, &overrides.remote_origin) {
                (Some(url), _) => url.clone(),
                (None, Some(origin)) => origin.clone(),
                (None, None) => {
                    return Err(AppError::Config(format!(
                        "no remote origin configured for host '{origin_host}' \
                         (set FRONTDESK_REMOTE_ORIGIN or FRONTDESK_API_URL)"
                    )))
                }
            };
            let ws = match (&overrides.ws_url, &overrides.remote_origin) {
                (Some(url), _) => url.clone(),
                (None, Some(origin)) => to_ws_origin(origin),
                (None, None) => {
                    return Err(AppError::Config(
                        "no remote websocket origin configured".to_string(),
                    ))
                }
            };
            let voice = match (&overrides.voice_url, &overrides.remote_voice_origin) {
                (Some(url), _) => url.clone(),
                (None, Some(origin)) => to_ws_origin(origin),
                (None, None) => {
                    return Err(AppError::Config(
                        "no remote voice origin configured \
                         (set FRONTDESK_REMOTE_VOICE_ORIGIN or FRONTDESK_VOICE_URL)"
                            .to_string(),
                    ))
                }
            };
            (api, ws, voice)
        };

        let token_route = match overrides.token_route.as_deref() {
            Some("connect") => TokenRoute::Connect,
            _ => TokenRoute::Token,
        };

        let defaults = FeatureFlags::default();
        let features = FeatureFlags {
            voice_enabled: overrides.voice_enabled.unwrap_or(defaults.voice_enabled),
            realtime_updates: overrides
                .realtime_updates
                .unwrap_or(defaults.realtime_updates),
            demo_mode: overrides.demo_mode.unwrap_or(defaults.demo_mode),
        };

        Ok(Self {
            api_base_url,
            ws_url,
            voice_url,
            environment: if dev {
                Environment::Development
            } else {
                Environment::Production
            },
            token_route,
            features,
        })
    }

    pub fn from_env() -> Result<Self, AppError> {
        let host =
            env::var("FRONTDESK_ORIGIN_HOST").unwrap_or_else(|_| "localhost".to_string());
        Self::resolve(&host, &Overrides::from_env())
    }

    /// Load the optional saved configuration blob. Returns None when the
    /// file is absent or unreadable; a saved blob replaces resolution
    /// entirely.
    pub fn load_saved(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "ignoring invalid saved config");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("serialize config: {e}")))?;
        std::fs::write(path, raw)
            .map_err(|e| AppError::Config(format!("write {}: {e}", path.display())))
    }

    pub fn token_endpoint(&self) -> String {
        match self.token_route {
            TokenRoute::Token => format!("{}/api/sofia/token", self.api_base_url),
            TokenRoute::Connect => format!("{}/api/sofia/connect", self.api_base_url),
        }
    }
}
