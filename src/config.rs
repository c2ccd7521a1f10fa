use std::env;
use std::path::PathBuf;

use anyhow::{Context, bail};

use crate::auth::users::AuthUsers;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Where the server accepts connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listen {
    Tcp(String),
    Unix(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: Listen,
    pub socket_mode: u32,
    pub root: PathBuf,
    pub read_prefix: String,
    pub upload_prefix: String,
    pub uploads_enabled: bool,
    pub auth_users: AuthUsers,
    pub max_upload_bytes: usize,
}

/// Normalise a URL prefix to `/segment[/segment]` or the empty string.
pub fn normalize_prefix(s: &str) -> String {
    let trimmed = s.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim(), "true" | "1" | "yes")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let listen = match env::var("MODVAULT_SOCKET") {
            Ok(path) if !path.is_empty() => Listen::Unix(PathBuf::from(path)),
            _ => Listen::Tcp(
                env::var("MODVAULT_LISTEN").unwrap_or_else(|_| "127.0.0.1:8080".into()),
            ),
        };

        let socket_mode = match env::var("MODVAULT_SOCKET_MODE") {
            Ok(v) => u32::from_str_radix(v.trim(), 8)
                .with_context(|| format!("MODVAULT_SOCKET_MODE is not octal: {v}"))?,
            Err(_) => 0o660,
        };

        let auth_users = match env::var("MODVAULT_AUTH_USERS") {
            Ok(v) if !v.trim().is_empty() => {
                AuthUsers::parse(&v).context("invalid MODVAULT_AUTH_USERS")?
            }
            _ => AuthUsers::default(),
        };

        let max_upload_bytes = match env::var("MODVAULT_MAX_UPLOAD_BYTES") {
            Ok(v) => v
                .trim()
                .parse()
                .with_context(|| format!("MODVAULT_MAX_UPLOAD_BYTES is not a number: {v}"))?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let config = Self {
            listen,
            socket_mode,
            root: env::var("MODVAULT_ROOT")
                .map_or_else(|_| PathBuf::from("/srv/modvault"), PathBuf::from),
            read_prefix: normalize_prefix(
                &env::var("MODVAULT_READ_PREFIX").unwrap_or_else(|_| "/dl".into()),
            ),
            upload_prefix: normalize_prefix(
                &env::var("MODVAULT_UPLOAD_PREFIX").unwrap_or_else(|_| "/ul".into()),
            ),
            uploads_enabled: env::var("MODVAULT_UPLOADS")
                .ok()
                .is_none_or(|v| parse_bool(&v)),
            auth_users,
            max_upload_bytes,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the router cannot serve unambiguously.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.uploads_enabled && self.read_prefix == self.upload_prefix {
            bail!(
                "upload prefix must differ from read prefix (both {:?})",
                self.read_prefix
            );
        }
        if self.max_upload_bytes == 0 {
            bail!("max upload size must be positive");
        }
        Ok(())
    }
}
