use std::error::Error as StdError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The input could not be turned into an absolute URL with a host.
    #[error("invalid URL '{input}': {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("error accessing {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("technology corpus could not be loaded: {0}")]
    CorpusLoad(String),

    #[error("could not parse {0}")]
    Parse(String),

    #[error("HTTP client could not be built: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AnalysisError {
    /// The message followed by every underlying cause, `: `-separated.
    ///
    /// reqwest hides the interesting part (refused, dns, timeout) a few
    /// sources deep, so facet messages use this instead of `Display`.
    pub fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source().and_then(|s| s.source());
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
