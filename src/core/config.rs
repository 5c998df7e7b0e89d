use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub backend: BackendConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub max_request_body_size: usize,
}

/// Which adapters back the store
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// In-process auth and documents; state is lost on exit
    Memory,
    /// PostgreSQL documents with Logto-hosted auth
    Hosted {
        database: DatabaseConfig,
        logto_m2m: LogtoM2MConfig,
    },
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

/// Configuration for Logto Machine-to-Machine (M2M) authentication
#[derive(Debug, Clone)]
pub struct LogtoM2MConfig {
    pub client_id: String,
    pub client_secret: String,
    pub resource: String,
    pub scope: String,
    pub token_url: String,
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Lifetime of a hosted session before it lapses
    pub ttl: Duration,
    /// How long login/register handlers wait for the user to be published
    pub user_sync_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        Ok(Config {
            app: AppConfig::from_env()?,
            backend: BackendConfig::from_env()?,
            session: SessionConfig::from_env()?,
        })
    }
}

impl AppConfig {
    const DEFAULT_MAX_REQUEST_BODY_SIZE: usize = 10 * 1024 * 1024; // 10MB

    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let max_request_body_size = env::var("MAX_REQUEST_BODY_SIZE")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_REQUEST_BODY_SIZE.to_string())
            .parse::<usize>()
            .map_err(|_| "MAX_REQUEST_BODY_SIZE must be a valid number".to_string())?;

        Ok(Self {
            host,
            port,
            cors_allowed_origins,
            max_request_body_size,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl BackendConfig {
    pub fn from_env() -> Result<Self, String> {
        let kind = env::var("BACKEND").unwrap_or_else(|_| "memory".to_string());
        Self::parse(&kind)
    }

    fn parse(kind: &str) -> Result<Self, String> {
        match kind.trim().to_lowercase().as_str() {
            "memory" => Ok(BackendConfig::Memory),
            "hosted" => Ok(BackendConfig::Hosted {
                database: DatabaseConfig::from_env()?,
                logto_m2m: LogtoM2MConfig::from_env()?,
            }),
            other => Err(format!(
                "BACKEND must be 'memory' or 'hosted', got '{}'",
                other
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::Memory => "memory",
            BackendConfig::Hosted { .. } => "hosted",
        }
    }
}

impl DatabaseConfig {
    const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    const DEFAULT_MIN_CONNECTIONS: u32 = 1;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600; // 10 minutes
    const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800; // 30 minutes

    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        Ok(Self {
            url,
            max_connections: parse_or("DB_MAX_CONNECTIONS", Self::DEFAULT_MAX_CONNECTIONS)?,
            min_connections: parse_or("DB_MIN_CONNECTIONS", Self::DEFAULT_MIN_CONNECTIONS)?,
            acquire_timeout_secs: parse_or(
                "DB_ACQUIRE_TIMEOUT_SECS",
                Self::DEFAULT_ACQUIRE_TIMEOUT_SECS,
            )?,
            idle_timeout_secs: parse_or("DB_IDLE_TIMEOUT_SECS", Self::DEFAULT_IDLE_TIMEOUT_SECS)?,
            max_lifetime_secs: parse_or("DB_MAX_LIFETIME_SECS", Self::DEFAULT_MAX_LIFETIME_SECS)?,
        })
    }
}

impl LogtoM2MConfig {
    pub fn from_env() -> Result<Self, String> {
        let client_id = env::var("LOGTO_M2M_CLIENT_ID")
            .map_err(|_| "LOGTO_M2M_CLIENT_ID environment variable is required".to_string())?;

        let client_secret = env::var("LOGTO_M2M_CLIENT_SECRET")
            .map_err(|_| "LOGTO_M2M_CLIENT_SECRET environment variable is required".to_string())?;

        let resource = env::var("LOGTO_M2M_RESOURCE")
            .unwrap_or_else(|_| "https://default.logto.app/api".to_string());

        let scope = env::var("LOGTO_M2M_SCOPE").unwrap_or_else(|_| "all".to_string());

        let issuer = env::var("LOGTO_ISSUER")
            .map_err(|_| "LOGTO_ISSUER environment variable is required".to_string())?;

        Ok(Self {
            client_id,
            client_secret,
            resource,
            scope,
            token_url: format!("{}/token", issuer),
            api_base_url: issuer.trim_end_matches("/oidc").to_string(),
        })
    }
}

impl SessionConfig {
    const DEFAULT_TTL_SECS: u64 = 3600;
    const DEFAULT_USER_SYNC_TIMEOUT_MS: u64 = 5000;

    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            ttl: Duration::from_secs(parse_or("SESSION_TTL_SECS", Self::DEFAULT_TTL_SECS)?),
            user_sync_timeout: Duration::from_millis(parse_or(
                "USER_SYNC_TIMEOUT_MS",
                Self::DEFAULT_USER_SYNC_TIMEOUT_MS,
            )?),
        })
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(Self::DEFAULT_TTL_SECS),
            user_sync_timeout: Duration::from_millis(Self::DEFAULT_USER_SYNC_TIMEOUT_MS),
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T, String>
where
    T: std::str::FromStr + ToString,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .map_err(|_| format!("{} must be a valid number", key))
}
