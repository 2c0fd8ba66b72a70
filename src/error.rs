//! Unified error handling for the gpx-sim library.
//!
//! None of the simulation core's failure paths are fatal: callers either
//! degrade to a no-op (bridge and renderer failures) or fall back to a
//! default (config and location lookups). This module gives those paths a
//! single error type to log and match on.

use std::fmt;

/// Unified error type for gpx-sim operations.
#[derive(Debug, Clone)]
pub enum SimError {
    /// A GPX file could not be read or parsed
    TrackLoad { path: String, message: String },
    /// The device bridge could not be spawned or reported a failure
    Bridge { message: String },
    /// The bridge configuration could not be loaded or saved
    Config { message: String },
    /// The approximate-location lookup failed
    Geolocation {
        message: String,
        status_code: Option<u16>,
    },
    /// Generic internal error
    Internal { message: String },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::TrackLoad { path, message } => {
                write!(f, "Failed to load track '{}': {}", path, message)
            }
            SimError::Bridge { message } => {
                write!(f, "Device bridge error: {}", message)
            }
            SimError::Config { message } => {
                write!(f, "Configuration error: {}", message)
            }
            SimError::Geolocation {
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "Geolocation error ({}): {}", code, message)
                } else {
                    write!(f, "Geolocation error: {}", message)
                }
            }
            SimError::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for SimError {}

/// Result type alias for gpx-sim operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// Extension trait for converting Option to SimError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a generic internal error.
    fn ok_or_internal(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_internal(self, message: &str) -> Result<T> {
        self.ok_or_else(|| SimError::Internal {
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::TrackLoad {
            path: "/tmp/ride.gpx".to_string(),
            message: "unexpected EOF".to_string(),
        };
        assert!(err.to_string().contains("/tmp/ride.gpx"));
        assert!(err.to_string().contains("unexpected EOF"));

        let err = SimError::Geolocation {
            message: "rate limited".to_string(),
            status_code: Some(429),
        };
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_internal("missing value");
        assert!(matches!(result, Err(SimError::Internal { .. })));
    }
}
