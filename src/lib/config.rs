//! ## Share Processor Configuration Module
//!
//! Defines [`ShareProcessorConfig`], loaded from TOML by the binary:
//! - the coin name, used as the namespace prefix of every key
//! - the store backend and its address ([`StoreConfig`])
//! - an optional log file
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Configuration for the share processor.
#[derive(Debug, Deserialize, Clone)]
pub struct ShareProcessorConfig {
    /// Coin name, prefix of every key written
    pub coin: String,
    /// Store the processor writes to
    #[serde(default)]
    pub store: StoreConfig,
    /// The path to the log file for the share processor.
    log_file: Option<PathBuf>,
}

/// Store backend selection.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Store host
    #[serde(default = "default_host")]
    pub host: String,
    /// Store port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(BackendKind::default(), default_host(), default_port())
    }
}

impl StoreConfig {
    pub fn new(backend: BackendKind, host: String, port: u16) -> Self {
        Self {
            backend,
            host,
            port,
        }
    }
}

impl ShareProcessorConfig {
    pub fn new(coin: String, store: StoreConfig) -> Self {
        Self {
            coin,
            store,
            log_file: None,
        }
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Override the log file, keeping the configured one when `None`.
    pub fn set_log_file(&mut self, log_file: Option<PathBuf>) {
        if let Some(log_file) = log_file {
            self.log_file = Some(log_file);
        }
    }
}
