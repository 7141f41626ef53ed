//! Advisory store version probe.
//!
//! Stores older than 2.6 lack the scripting and float increment primitives the
//! processor relies on. The probe only logs, it never blocks processing.

use tracing::{debug, error};

use crate::store::StoreClient;

/// Oldest store version with the required primitives.
pub const MIN_STORE_VERSION: (u32, u32) = (2, 6);

/// Outcome of [`check_store_version`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    Supported(String),
    TooOld(String),
    /// Version could not be read or parsed
    Unknown,
}

/// Major and minor components of a `major.minor[.patch]` version string.
pub fn parse_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(minor) => minor.parse().ok()?,
        None => 0,
    };
    Some((major, minor))
}

/// Extract `redis_version` from a raw `INFO` reply.
pub fn parse_info_version(info: &str) -> Option<String> {
    info.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        (name.trim() == "redis_version").then(|| value.trim().to_string())
    })
}

/// Probe the store version and log when it is missing or too old.
pub async fn check_store_version(store: &dyn StoreClient) -> VersionCheck {
    let version = match store.server_version().await {
        Ok(Some(version)) => version,
        Ok(None) => {
            error!("Could not detect store version - may be super old or broken");
            return VersionCheck::Unknown;
        }
        Err(e) => {
            error!("Store version check failed: {}", e);
            return VersionCheck::Unknown;
        }
    };

    match parse_version(&version) {
        None => {
            error!("Could not parse store version `{}`", version);
            VersionCheck::Unknown
        }
        Some(parsed) if parsed < MIN_STORE_VERSION => {
            error!(
                "Store version {} is below the minimum required version {}.{}",
                version, MIN_STORE_VERSION.0, MIN_STORE_VERSION.1
            );
            VersionCheck::TooOld(version)
        }
        Some(_) => {
            debug!("Store version {} supported", version);
            VersionCheck::Supported(version)
        }
    }
}
