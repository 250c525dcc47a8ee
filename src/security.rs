use serde::{Deserialize, Serialize};

use crate::fetch::FetchResult;

/// Transport-security posture of one response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityReport {
    /// Whether the final URL, after redirects, was https.
    pub uses_https: bool,
    /// In the configured order. `None` means the header was absent,
    /// `Some("")` that it was sent with an empty value.
    pub headers: Vec<HeaderPresence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderPresence {
    pub name: String,
    pub value: Option<String>,
}

impl SecurityReport {
    pub fn header(&self, name: &str) -> Option<&HeaderPresence> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
    }
}

pub fn check_security<S: AsRef<str>>(fetch: &FetchResult, header_names: &[S]) -> SecurityReport {
    let headers = header_names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            HeaderPresence {
                name: name.to_string(),
                value: fetch
                    .headers
                    .get(name)
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned()),
            }
        })
        .collect();

    SecurityReport {
        uses_https: fetch.scheme == "https",
        headers,
    }
}
