//! Version and server signatures.

use serde::Serialize;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const RTMPLB_SIGNATURE: &str = concat!("RTMPLB/", env!("CARGO_PKG_VERSION"));
pub const HTTPLB_SIGNATURE: &str = concat!("HTTPLB/", env!("CARGO_PKG_VERSION"));

/// Body of `/api/v1/version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub major: u64,
    pub minor: u64,
    pub revision: u64,
    pub version: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        let mut parts = VERSION
            .split(['.', '-', '+'])
            .map(|p| p.parse::<u64>().unwrap_or(0));

        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            revision: parts.next().unwrap_or(0),
            version: VERSION.to_string(),
        }
    }
}
