use std::fmt;

/// Errors surfaced by the leaderboard engine.
#[derive(Debug)]
pub enum Error {
    /// Invalid configuration or schema definition. Fatal to the construction
    /// call, never retried.
    Config(String),
    /// Invalid query input - unknown category/timeframe or an unsupported
    /// board combination. Safe to show to callers.
    Query(String),
    /// Backing-store failures, passed through with store-native detail
    /// preserved in the chain.
    Store(anyhow::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::Query(msg) => write!(f, "query error: {}", msg),
            Error::Store(err) => write!(f, "store error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_the_offender() {
        let err = Error::Config("duplicate category 'profit'".into());

        assert_eq!(err.to_string(), "configuration error: duplicate category 'profit'");
    }

    #[test]
    fn query_error_names_the_offender() {
        let err = Error::Query("unknown timeframe 'week'".into());

        assert_eq!(err.to_string(), "query error: unknown timeframe 'week'");
    }

    #[test]
    fn store_error_preserves_native_detail() {
        // Simulating what happens when the backing store connection drops
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "store down");
        let err: Error = anyhow::Error::from(io_err).into();

        assert!(matches!(err, Error::Store(_)));
        assert!(err.to_string().contains("store down"));

        let source = std::error::Error::source(&err).expect("store errors carry a source");
        assert!(source.to_string().contains("store down"));
    }
}
