use anyhow::Context;
use base64::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Decoded store credential. `None` disables every store-backed feature.
    pub service_account: Option<ServiceAccount>,
    pub api_server: ServerConfig,
    pub redirect_server: ServerConfig,
    pub redirect: RedirectConfig,
    pub cache: CacheConfig,
    pub dispatch: DispatchConfig,
    pub admin: AdminConfig,
    pub pagination: PaginationConfig,
}

/// Credential payload carried base64-encoded in `SERVICE_ACCOUNT_KEY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub database_url: String,
    #[serde(default = "ServiceAccount::default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectConfig {
    /// Where unknown short codes are sent
    pub not_found_path: String,
    /// Origin used to expand relative destinations. Falls back to the Host header.
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub buffer_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub cursor_hmac_secret: Option<String>,
}

impl ServiceAccount {
    const fn default_max_connections() -> u32 {
        5
    }

    /// Decode a base64 JSON credential
    pub fn decode(encoded: &str) -> anyhow::Result<Self> {
        let raw = BASE64_STANDARD
            .decode(encoded.trim())
            .context("SERVICE_ACCOUNT_KEY is not valid base64")?;
        let account: ServiceAccount = serde_json::from_slice(&raw)
            .context("SERVICE_ACCOUNT_KEY does not contain a valid credential document")?;
        if account.database_url.trim().is_empty() {
            anyhow::bail!("SERVICE_ACCOUNT_KEY credential has an empty database_url");
        }
        Ok(account)
    }
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            not_found_path: "/not-found".to_string(),
            public_base_url: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_secs: 300,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            buffer_size: 10_000,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        // A broken credential degrades the same way as a missing one
        let service_account = match std::env::var("SERVICE_ACCOUNT_KEY") {
            Ok(encoded) if !encoded.trim().is_empty() => match ServiceAccount::decode(&encoded) {
                Ok(account) => Some(account),
                Err(e) => {
                    tracing::error!(error = %e, "Ignoring unusable service account credential");
                    None
                }
            },
            _ => None,
        };

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("API_PORT must be a valid port")?;

        let redirect_host =
            std::env::var("REDIRECT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let redirect_port = std::env::var("REDIRECT_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("REDIRECT_PORT must be a valid port")?;

        let not_found_path =
            std::env::var("NOT_FOUND_PATH").unwrap_or_else(|_| "/not-found".to_string());
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .ok()
            .map(|v| v.trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty());

        let api_keys = std::env::var("ADMIN_API_KEYS")
            .map(|v| {
                v.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cursor_hmac_secret = std::env::var("CURSOR_HMAC_SECRET").ok();

        Ok(Config {
            service_account,
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            redirect_server: ServerConfig {
                host: redirect_host,
                port: redirect_port,
            },
            redirect: RedirectConfig {
                not_found_path,
                public_base_url,
            },
            cache: CacheConfig {
                max_entries: env_or("CACHE_MAX_ENTRIES", 10_000),
                ttl_secs: env_or("CACHE_TTL_SECS", 300),
            },
            dispatch: DispatchConfig {
                buffer_size: env_or("DISPATCH_BUFFER_SIZE", 10_000),
            },
            admin: AdminConfig { api_keys },
            pagination: PaginationConfig { cursor_hmac_secret },
        })
    }
}
