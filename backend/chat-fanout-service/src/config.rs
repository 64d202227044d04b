use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// How bearer tokens are verified.
#[derive(Debug, Clone)]
pub enum JwtKeyConfig {
    /// RS256 public key (PEM). Production setting.
    RsaPublicKeyPem(String),
    /// HS256 shared secret. Development and tests only.
    SharedSecret(String),
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Upper bound for credential verification during the handshake
    pub handshake_timeout: Duration,
    /// Connections silent for longer than this are dropped
    pub idle_timeout: Duration,
    /// Interval between server pings
    pub heartbeat_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub upload_dir: PathBuf,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// `None` keeps all state in process memory
    pub database_url: Option<String>,
    pub jwt: JwtKeyConfig,
    pub websocket: WebSocketConfig,
    pub max_message_bytes: usize,
    pub media: MediaConfig,
}

impl Config {
    fn parse_var<T: std::str::FromStr>(
        name: &str,
        default: T,
    ) -> Result<T, crate::error::AppError> {
        match env::var(name) {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                crate::error::AppError::Config(format!("{name} has an invalid value: {raw}"))
            }),
            Err(_) => Ok(default),
        }
    }

    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();

        let port = Self::parse_var("PORT", 8080u16)?;
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());

        let jwt = match (env::var("JWT_PUBLIC_KEY_PEM"), env::var("JWT_SECRET")) {
            (Ok(pem), _) if !pem.trim().is_empty() => JwtKeyConfig::RsaPublicKeyPem(pem),
            (_, Ok(secret)) if !secret.is_empty() => JwtKeyConfig::SharedSecret(secret),
            _ => {
                return Err(crate::error::AppError::Config(
                    "either JWT_PUBLIC_KEY_PEM or JWT_SECRET must be set".into(),
                ))
            }
        };

        let websocket = WebSocketConfig {
            handshake_timeout: Duration::from_secs(Self::parse_var(
                "WS_HANDSHAKE_TIMEOUT_SECS",
                10u64,
            )?),
            idle_timeout: Duration::from_secs(Self::parse_var("WS_IDLE_TIMEOUT_SECS", 30u64)?),
            heartbeat_interval: Duration::from_secs(Self::parse_var(
                "WS_HEARTBEAT_INTERVAL_SECS",
                5u64,
            )?),
        };

        if websocket.heartbeat_interval >= websocket.idle_timeout {
            return Err(crate::error::AppError::Config(
                "WS_HEARTBEAT_INTERVAL_SECS must be shorter than WS_IDLE_TIMEOUT_SECS".into(),
            ));
        }

        let max_message_bytes = Self::parse_var("MAX_MESSAGE_BYTES", 128 * 1024usize)?;

        let media = MediaConfig {
            upload_dir: PathBuf::from(
                env::var("MEDIA_UPLOAD_DIR").unwrap_or_else(|_| "uploads".into()),
            ),
            base_url: env::var("MEDIA_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{port}/files")),
        };

        Ok(Self {
            port,
            database_url,
            jwt,
            websocket,
            max_message_bytes,
            media,
        })
    }

    /// Defaults for tests: in-memory storage, HS256 secret, short timeouts.
    pub fn test_defaults() -> Self {
        Self {
            port: 0,
            database_url: None,
            jwt: JwtKeyConfig::SharedSecret("test-secret".into()),
            websocket: WebSocketConfig {
                handshake_timeout: Duration::from_secs(2),
                idle_timeout: Duration::from_secs(10),
                heartbeat_interval: Duration::from_secs(1),
            },
            max_message_bytes: 128 * 1024,
            media: MediaConfig {
                upload_dir: env::temp_dir().join("chat-fanout-uploads"),
                base_url: "http://localhost/files".into(),
            },
        }
    }
}
