use std::fmt;

/// Routing table configuration and dispatch errors
///
/// Configuration variants are returned at registration time and are never
/// retried. `RedirectLimit` is the only variant produced while serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// A layer index outside `0..layer_count` was passed to `add`
    InvalidLayer {
        /// The requested layer
        layer: usize,
        /// Number of layers the handler owns
        layer_count: usize,
    },
    /// Two layer handlers with different layer counts were combined
    LayerCountMismatch {
        /// Layer count of the receiving handler
        expected: usize,
        /// Layer count of the handler being merged in
        found: usize,
    },
    /// A method filter string was neither `*` nor a valid HTTP method token
    InvalidMethod {
        /// The rejected input
        method: String,
    },
    /// A request kept redirecting past the configured hop limit
    RedirectLimit {
        /// Hops taken before giving up
        hops: usize,
        /// The redirect target that would have been dispatched next
        path: String,
    },
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::InvalidLayer { layer, layer_count } => {
                write!(
                    f,
                    "Layer index {} out of bounds: handler owns {} layers",
                    layer, layer_count
                )
            }
            RouterError::LayerCountMismatch { expected, found } => {
                write!(
                    f,
                    "Cannot combine layer handlers with different layer counts: {} != {}",
                    found, expected
                )
            }
            RouterError::InvalidMethod { method } => {
                write!(f, "Invalid request method filter '{}'", method)
            }
            RouterError::RedirectLimit { hops, path } => {
                write!(
                    f,
                    "Redirect limit reached after {} hops (next target '{}')",
                    hops, path
                )
            }
        }
    }
}

impl std::error::Error for RouterError {}

/// Errors raised while loading [`crate::config::AppConfig`]
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read
    Io {
        /// Path that failed to load
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// The config file is not valid TOML for `AppConfig`
    Parse {
        /// Path that failed to parse
        path: String,
        /// Parser message
        message: String,
    },
    /// An environment override held a value of the wrong type
    InvalidEnv {
        /// Environment variable name
        key: &'static str,
        /// The rejected value
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path, source)
            }
            ConfigError::Parse { path, message } => {
                write!(f, "Failed to parse config file '{}': {}", path, message)
            }
            ConfigError::InvalidEnv { key, value } => {
                write!(f, "Invalid value '{}' for environment variable {}", value, key)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = RouterError::InvalidLayer {
            layer: 3,
            layer_count: 2,
        };
        assert_eq!(
            err.to_string(),
            "Layer index 3 out of bounds: handler owns 2 layers"
        );

        let err = RouterError::LayerCountMismatch {
            expected: 2,
            found: 3,
        };
        assert!(err.to_string().contains("3 != 2"));

        let err = ConfigError::InvalidEnv {
            key: "STRATA_WORKER_THREADS",
            value: "lots".into(),
        };
        assert!(err.to_string().contains("STRATA_WORKER_THREADS"));
    }
}
