use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::warn;

/// Placeholder JWT secrets that MUST NOT be used outside dev mode.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

const DEV_SECRET: &str = "dev-secret-change-me";

/// Upper bound for `DUET_BODY_LIMIT_MB`. Images arrive as base64 JSON, so a
/// few megabytes is typical.
const MAX_BODY_LIMIT_MB: usize = 1024;

/// Server settings, read from `DUET_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// Allows the placeholder secret and non-Secure session cookies.
    pub dev_mode: bool,
    /// When set, CORS only admits this origin (with credentials).
    pub frontend_origin: Option<String>,
    pub media_upload_url: Option<String>,
    pub media_api_key: Option<String>,
    pub body_limit_mb: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let dev_mode = match var("DUET_DEV_MODE").as_deref() {
            None => false,
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            Some(other) => bail!("DUET_DEV_MODE must be true or false, got '{}'", other),
        };

        let jwt_secret = match var("DUET_JWT_SECRET") {
            Some(secret) if !PLACEHOLDER_SECRETS.contains(&secret.as_str()) => secret,
            _ if dev_mode => {
                warn!("DUET_JWT_SECRET unset or placeholder, using the dev secret");
                DEV_SECRET.to_string()
            }
            _ => bail!("DUET_JWT_SECRET is unset or still a placeholder; set it or enable DUET_DEV_MODE"),
        };

        let port = match var("DUET_PORT") {
            Some(raw) => raw.parse().with_context(|| format!("invalid DUET_PORT '{}'", raw))?,
            None => 5001,
        };

        let body_limit_mb: usize = match var("DUET_BODY_LIMIT_MB") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid DUET_BODY_LIMIT_MB '{}'", raw))?,
            None => 5,
        };
        if !(1..=MAX_BODY_LIMIT_MB).contains(&body_limit_mb) {
            bail!(
                "DUET_BODY_LIMIT_MB must be between 1 and {}, got {}",
                MAX_BODY_LIMIT_MB,
                body_limit_mb
            );
        }

        Ok(Self {
            host: var("DUET_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("DUET_DB_PATH").unwrap_or_else(|| "duet.db".into()).into(),
            jwt_secret,
            dev_mode,
            frontend_origin: var("DUET_FRONTEND_ORIGIN"),
            media_upload_url: var("DUET_MEDIA_UPLOAD_URL"),
            media_api_key: var("DUET_MEDIA_API_KEY"),
            body_limit_mb,
        })
    }

    /// Request body limit in bytes.
    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_mb * 1024 * 1024
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_with_real_secret() {
        let cfg = config(&[("DUET_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(cfg.port, 5001);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.db_path, PathBuf::from("duet.db"));
        assert_eq!(cfg.body_limit_mb, 5);
        assert!(!cfg.dev_mode);
        assert!(cfg.frontend_origin.is_none());
        assert!(cfg.media_upload_url.is_none());
        assert_eq!(cfg.addr().unwrap().port(), 5001);
    }

    #[test]
    fn placeholder_secret_rejected_outside_dev_mode() {
        assert!(config(&[]).is_err());
        assert!(config(&[("DUET_JWT_SECRET", "dev-secret-change-me")]).is_err());

        let dev = config(&[("DUET_DEV_MODE", "true")]).unwrap();
        assert_eq!(dev.jwt_secret, DEV_SECRET);
    }

    #[test]
    fn parses_overrides() {
        let cfg = config(&[
            ("DUET_JWT_SECRET", "s3cret"),
            ("DUET_HOST", "127.0.0.1"),
            ("DUET_PORT", "8080"),
            ("DUET_FRONTEND_ORIGIN", "http://localhost:5173"),
            ("DUET_MEDIA_UPLOAD_URL", "https://media.example/upload"),
            ("DUET_BODY_LIMIT_MB", "12"),
        ])
        .unwrap();
        assert_eq!(cfg.addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(cfg.frontend_origin.as_deref(), Some("http://localhost:5173"));
        assert_eq!(cfg.media_upload_url.as_deref(), Some("https://media.example/upload"));
        assert_eq!(cfg.body_limit_mb, 12);
    }

    #[test]
    fn rejects_garbage_numbers() {
        assert!(config(&[("DUET_JWT_SECRET", "s"), ("DUET_PORT", "http")]).is_err());
        assert!(config(&[("DUET_JWT_SECRET", "s"), ("DUET_DEV_MODE", "maybe")]).is_err());
    }

    #[test]
    fn body_limit_is_bounded() {
        let huge = usize::MAX.to_string();
        for raw in ["0", "1025", huge.as_str()] {
            assert!(config(&[("DUET_JWT_SECRET", "s"), ("DUET_BODY_LIMIT_MB", raw)]).is_err());
        }

        let max = config(&[("DUET_JWT_SECRET", "s"), ("DUET_BODY_LIMIT_MB", "1024")]).unwrap();
        assert_eq!(max.body_limit_bytes(), 1024 * 1024 * 1024);
        let default = config(&[("DUET_JWT_SECRET", "s")]).unwrap();
        assert_eq!(default.body_limit_bytes(), 5 * 1024 * 1024);
    }
}
