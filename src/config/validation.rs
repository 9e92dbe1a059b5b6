//! Configuration validation.
//!
//! Serde handles syntax; this module checks meaning. Every problem is
//! collected so one failed start reports all of them.

use thiserror::Error;

use crate::config::schema::{HttpLbConfig, LogConfig, MetricsConfig, RtmpLbConfig};
use crate::net::address::{AddressError, ListenAddr};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_TANKS: &[&str] = &["console", "file"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is empty")]
    Empty { field: &'static str },

    #[error("{field}: {source}")]
    Address {
        field: &'static str,
        #[source]
        source: AddressError,
    },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("log.level must be one of trace/debug/info/warn/error, actual is {0}")]
    LogLevel(String),

    #[error("log.tank must be console or file, actual is {0}")]
    LogTank(String),

    #[error("log.file must not be empty for the file tank")]
    LogFile,

    #[error("metrics.address {0} is not a socket address")]
    MetricsAddress(String),
}

/// Implemented by each root config.
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<ValidationError>>;
}

impl Validate for RtmpLbConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        check_address(&mut errors, "api", &self.api);
        if self.rtmp.listens.is_empty() {
            errors.push(ValidationError::Empty { field: "rtmp.listens" });
        }
        for listen in &self.rtmp.listens {
            check_address(&mut errors, "rtmp.listens", listen);
        }

        if self.backend.retry_max == 0 {
            errors.push(ValidationError::Zero { field: "backend.retry_max" });
        }
        if self.backend.connect_timeout_ms == 0 {
            errors.push(ValidationError::Zero { field: "backend.connect_timeout_ms" });
        }

        check_log(&mut errors, &self.log);
        check_metrics(&mut errors, &self.metrics);

        finish(errors)
    }
}

impl Validate for HttpLbConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        check_address(&mut errors, "api", &self.api);
        check_address(&mut errors, "http.listen", &self.http.listen);

        if self.hls_plus.session_timeout_secs == 0 {
            errors.push(ValidationError::Zero { field: "hls_plus.session_timeout_secs" });
        }
        if self.hls_plus.sweep_interval_secs == 0 {
            errors.push(ValidationError::Zero { field: "hls_plus.sweep_interval_secs" });
        }
        if self.upstream.connect_timeout_secs == 0 {
            errors.push(ValidationError::Zero { field: "upstream.connect_timeout_secs" });
        }

        check_log(&mut errors, &self.log);
        check_metrics(&mut errors, &self.metrics);

        finish(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.is_empty() {
        errors.push(ValidationError::Empty { field });
        return;
    }
    if let Err(source) = value.parse::<ListenAddr>() {
        errors.push(ValidationError::Address { field, source });
    }
}

fn check_log(errors: &mut Vec<ValidationError>, log: &LogConfig) {
    if !LOG_LEVELS.contains(&log.level.as_str()) {
        errors.push(ValidationError::LogLevel(log.level.clone()));
    }
    if !LOG_TANKS.contains(&log.tank.as_str()) {
        errors.push(ValidationError::LogTank(log.tank.clone()));
    }
    if log.tank == "file" && log.file.as_deref().map_or(true, str::is_empty) {
        errors.push(ValidationError::LogFile);
    }
}

fn check_metrics(errors: &mut Vec<ValidationError>, metrics: &MetricsConfig) {
    if metrics.enabled && metrics.address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::MetricsAddress(metrics.address.clone()));
    }
}

fn finish(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RtmpLbConfig::default().validate().is_ok());
        assert!(HttpLbConfig::default().validate().is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = RtmpLbConfig::default();
        config.api = String::new();
        config.rtmp.listens = vec!["udp://:1935".into(), "tcp://:1935".into()];
        config.backend.retry_max = 0;
        config.log.tank = "file".into();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::Empty { field: "api" }));
        assert!(errors.contains(&ValidationError::Zero { field: "backend.retry_max" }));
        assert!(errors.contains(&ValidationError::LogFile));
    }

    #[test]
    fn rejects_empty_listen_list() {
        let mut config = RtmpLbConfig::default();
        config.rtmp.listens.clear();
        let errors = config.validate().unwrap_err();
        assert_eq!(errors, vec![ValidationError::Empty { field: "rtmp.listens" }]);
    }

    #[test]
    fn http_listen_must_have_one_network() {
        let mut config = HttpLbConfig::default();
        config.http.listen = "tcp://tcp://:8080".into();
        config.log.level = "verbose".into();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ValidationError::LogLevel("verbose".into())));
    }
}
