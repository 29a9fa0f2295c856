use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

use crate::http::body::{BodyLimits, DEFAULT_MAX_BODY_BYTES};

pub const DEFAULT_HANDLER_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub max_body_bytes: usize,
    pub handler_timeout_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("JRPC_MAX_BODY_BYTES must be a positive integer")]
    InvalidMaxBodyBytes,
    #[error("JRPC_HANDLER_TIMEOUT_MS must be a non-negative integer")]
    InvalidHandlerTimeout,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
        let bind_port = env::var("BIND_PORT")
            .ok()
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);
        let max_body_bytes = env::var("JRPC_MAX_BODY_BYTES")
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|limit| *limit > 0)
                    .ok_or(ConfigError::InvalidMaxBodyBytes)
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);
        let handler_timeout_ms = env::var("JRPC_HANDLER_TIMEOUT_MS")
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidHandlerTimeout)
            })
            .transpose()?
            .unwrap_or(DEFAULT_HANDLER_TIMEOUT_MS);

        let config = Self {
            bind_addr,
            bind_port,
            max_body_bytes,
            handler_timeout_ms,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }

    pub fn body_limits(&self) -> BodyLimits {
        BodyLimits {
            max_body_bytes: self.max_body_bytes,
        }
    }

    /// `None` when the timeout is disabled with `0`.
    pub fn handler_timeout(&self) -> Option<Duration> {
        (self.handler_timeout_ms > 0).then(|| Duration::from_millis(self.handler_timeout_ms))
    }
}
