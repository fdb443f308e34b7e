use config::{Config, ConfigError};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::{env, path::Path, result::Result, time::Duration};
use url::Url;

/// Lowest interval the cycle driver accepts
pub const MIN_POLLING_INTERVAL_SECS: u64 = 10;
/// Highest interval accepted from the scheduler endpoint
pub const MAX_POLLING_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub folder: String,
    pub batch_size: u32,
    pub max_concurrent_classifications: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub auto_start: bool,
    pub default_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl GraphConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub deployment: String,
    pub api_version: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptLimits {
    pub rate_limit_per_sec: usize,
    pub refill_interval_ms: usize,
    pub refill_amount: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub prompt_limits: PromptLimits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthFileConfig {
    pub authority: String,
    pub scopes: Vec<String>,
    pub state_ttl_secs: i64,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    settings: Settings,
    scheduler: SchedulerConfig,
    graph: GraphConfig,
    model: ModelConfig,
    api: ApiConfig,
    oauth: OAuthFileConfig,
}

impl ConfigFile {
    fn from_file(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::with_name(path))
            .build()?
            .try_deserialize()
    }
}

/// Microsoft identity platform app registration, read from the environment
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub redirect_uri: String,
    pub authority: String,
    pub scopes: Vec<String>,
    pub state_ttl_secs: i64,
}

impl OAuthConfig {
    pub fn authorize_url(&self) -> Url {
        // authority comes from config.toml and is validated at startup
        Url::parse(&format!(
            "{}/{}/oauth2/v2.0/authorize",
            self.authority, self.tenant_id
        ))
        .expect("authority is not a valid URL")
    }

    pub fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant_id)
    }
}

/// Azure OpenAI endpoint and key. Absent when inference is not configured,
/// in which case classification runs on the keyword table.
#[derive(Clone)]
pub struct InferenceCredentials {
    pub endpoint: String,
    pub api_key: String,
}

impl std::fmt::Debug for InferenceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceCredentials")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
pub struct ServerConfig {
    pub settings: Settings,
    pub scheduler: SchedulerConfig,
    pub graph: GraphConfig,
    pub model: ModelConfig,
    pub api: ApiConfig,
    pub oauth: OAuthConfig,
    pub inference: Option<InferenceCredentials>,
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Server Config:\n{:?}\n\nScheduler: {:?}\n\nGraph: {:?}\n\nModel: {:?}\n\nAPI: {:?}\n\nOAuth: client_id={} tenant={} redirect={}\n\nInference: {}",
            self.settings,
            self.scheduler,
            self.graph,
            self.model,
            self.api,
            self.oauth.client_id,
            self.oauth.tenant_id,
            self.oauth.redirect_uri,
            self.inference
                .as_ref()
                .map(|i| i.endpoint.as_str())
                .unwrap_or("not configured (keyword fallback)"),
        )
    }
}

/// Resolve the polling interval from the raw `POLLING_INTERVAL` value.
/// Values under the floor are raised to it; unparseable values use `default`.
pub fn resolve_polling_interval(raw: Option<&str>, default: u64) -> u64 {
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().parse::<u64>() {
        Ok(interval) if interval < MIN_POLLING_INTERVAL_SECS => {
            tracing::warn!(
                "POLLING_INTERVAL {}s is below minimum {}s, using {}s",
                interval,
                MIN_POLLING_INTERVAL_SECS,
                MIN_POLLING_INTERVAL_SECS
            );
            MIN_POLLING_INTERVAL_SECS
        }
        Ok(interval) => interval,
        Err(_) => {
            tracing::warn!("Invalid POLLING_INTERVAL in environment, using default");
            default
        }
    }
}

pub fn default_polling_interval() -> u64 {
    resolve_polling_interval(
        env::var("POLLING_INTERVAL").ok().as_deref(),
        cfg.scheduler.default_interval_secs,
    )
}

pub fn scheduler_auto_start() -> bool {
    env::var("SCHEDULER_AUTO_START")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(cfg.scheduler.auto_start)
}

fn config_root() -> String {
    env::var("APP_DIR").unwrap_or_else(|_| {
        let dir =
            env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR or APP_DIR is required");
        let dir = Path::new(&dir).parent().unwrap().display().to_string();
        format!("{}/config", dir)
    })
}

lazy_static! {
    pub static ref cfg: ServerConfig = {
        let root = config_root();
        let path = format!("{root}/config.toml");
        let ConfigFile {
            settings,
            scheduler,
            graph,
            model,
            api,
            oauth,
        } = ConfigFile::from_file(&path).expect("config.toml is required");

        let oauth = OAuthConfig {
            client_id: env::var("CLIENT_ID").expect("CLIENT_ID is required"),
            client_secret: env::var("CLIENT_SECRET").expect("CLIENT_SECRET is required"),
            tenant_id: env::var("TENANT_ID").unwrap_or_else(|_| "common".to_string()),
            redirect_uri: env::var("REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost:8000/auth/callback".to_string()),
            authority: oauth.authority,
            scopes: oauth.scopes,
            state_ttl_secs: oauth.state_ttl_secs,
        };
        Url::parse(&oauth.authority).expect("oauth.authority is invalid");

        let inference = match (
            env::var("AZURE_OPENAI_ENDPOINT"),
            env::var("AZURE_OPENAI_KEY"),
        ) {
            (Ok(endpoint), Ok(api_key)) if !endpoint.is_empty() && !api_key.is_empty() => {
                Some(InferenceCredentials { endpoint, api_key })
            }
            _ => None,
        };

        let model = ModelConfig {
            deployment: env::var("AZURE_OPENAI_DEPLOYMENT").unwrap_or(model.deployment),
            api_version: env::var("AZURE_OPENAI_API_VERSION").unwrap_or(model.api_version),
            ..model
        };

        ServerConfig {
            settings,
            scheduler,
            graph,
            model,
            api,
            oauth,
            inference,
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polling_interval_default_when_unset() {
        assert_eq!(resolve_polling_interval(None, 60), 60);
    }

    #[test]
    fn test_polling_interval_below_floor_is_raised() {
        assert_eq!(resolve_polling_interval(Some("3"), 60), 10);
    }

    #[test]
    fn test_polling_interval_invalid_uses_default() {
        assert_eq!(resolve_polling_interval(Some("soon"), 45), 45);
        assert_eq!(resolve_polling_interval(Some("-5"), 45), 45);
    }

    #[test]
    fn test_polling_interval_valid_value() {
        assert_eq!(resolve_polling_interval(Some(" 120 "), 60), 120);
    }

    #[test]
    fn test_config_file_parses() {
        let path = format!(
            "{}/../config/config.toml",
            env!("CARGO_MANIFEST_DIR")
        );
        let file = ConfigFile::from_file(&path).expect("config.toml should parse");
        assert_eq!(file.settings.batch_size, 50);
        assert!(file.scheduler.default_interval_secs >= MIN_POLLING_INTERVAL_SECS);
        assert!(!file.oauth.scopes.is_empty());
    }
}
