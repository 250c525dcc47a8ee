use std::fmt;

use url::Url;

use crate::error::{AnalysisError, Result};

/// An absolute http(s) URL with a non-empty host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
}

impl Target {
    /// Defaults scheme-less input to `https://`, then parses it.
    pub fn normalize(input: &str) -> Result<Target> {
        let input = input.trim();
        let with_scheme = if input.starts_with("http://") || input.starts_with("https://") {
            input.to_string()
        } else {
            format!("https://{}", input)
        };

        let url = Url::parse(&with_scheme).map_err(|e| AnalysisError::InvalidUrl {
            input: input.to_string(),
            reason: e.to_string(),
        })?;

        match url.host_str() {
            Some(host) if !host.is_empty() => Ok(Target { url }),
            _ => Err(AnalysisError::InvalidUrl {
                input: input.to_string(),
                reason: "URL without a valid domain".to_string(),
            }),
        }
    }

    /// The origin host, used to tell first-party references from third-party ones.
    pub fn host(&self) -> &str {
        // checked in normalize
        self.url.host_str().unwrap_or_default()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_less_input_defaults_to_https() {
        let target = Target::normalize("example.com").unwrap();
        assert_eq!(target.as_str(), "https://example.com/");
        assert_eq!(target.host(), "example.com");

        let target = Target::normalize("www.example.com/path?q=1").unwrap();
        assert_eq!(target.as_str(), "https://www.example.com/path?q=1");
    }

    #[test]
    fn explicit_schemes_are_kept() {
        let target = Target::normalize("http://example.com").unwrap();
        assert_eq!(target.url().scheme(), "http");

        let target = Target::normalize("https://example.com:8443/a").unwrap();
        assert_eq!(target.url().scheme(), "https");
        assert_eq!(target.host(), "example.com");
        assert_eq!(target.url().port(), Some(8443));
    }

    #[test]
    fn missing_host_is_invalid() {
        for input in ["", "https://", "http://", "   "] {
            match Target::normalize(input) {
                Err(AnalysisError::InvalidUrl { .. }) => {}
                other => panic!("{:?} should be invalid, got {:?}", input, other),
            }
        }
    }

    #[test]
    fn unparseable_host_is_invalid() {
        assert!(matches!(
            Target::normalize("exa mple.com"),
            Err(AnalysisError::InvalidUrl { .. })
        ));
    }
}
