use thiserror::Error;

/// Errors from the correlation engine. All of them are construction-time
/// failures: missing telemetry is "not ready", never an error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The `--extractor=` token names a grammar nothing implements.
    #[error("unknown extractor type in \"{0}\"")]
    UnknownExtractor(String),

    /// The `--processor=` token names a check-output convention nothing
    /// implements.
    #[error("unknown processor in \"{0}\"")]
    UnknownProcessor(String),

    /// A required command-line argument is absent.
    #[error("missing argument --{arg} in \"{cmdline}\"")]
    MissingArgument {
        arg: &'static str,
        cmdline: String,
    },

    /// An attribute path does not match any of the supported shapes.
    #[error("unknown attribute path \"{0}\"")]
    InvalidPath(String),

    /// A configuration value failed validation.
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = EngineError::MissingArgument {
            arg: "host_path",
            cmdline: "--extractor=attributes".into(),
        };
        assert!(err.to_string().contains("--host_path"));
        assert!(EngineError::UnknownProcessor("--processor=foo".into())
            .to_string()
            .contains("foo"));
    }
}
