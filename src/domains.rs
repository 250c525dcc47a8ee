use std::collections::BTreeSet;

use regex::bytes::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::error::AnalysisError;

lazy_static! {
    // scheme plus host characters, stopping at the first '/', quote, ':' or space
    static ref ABSOLUTE_URL: Regex =
        Regex::new(r"https?://[a-zA-Z0-9.\-]+").expect("valid absolute URL pattern");
}

/// Hosts of absolute URLs in `body` other than `origin_host`.
///
/// The comparison is exact: subdomains of the origin count as third-party.
pub fn extract_third_party_domains(body: &[u8], origin_host: &str) -> BTreeSet<String> {
    let mut domains = BTreeSet::new();
    for m in ABSOLUTE_URL.find_iter(body) {
        match host_of(m.as_bytes()) {
            Ok(Some(host)) if host != origin_host => {
                domains.insert(host);
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "skipping reference"),
        }
    }
    debug!(origin = origin_host, found = domains.len(), "third-party domains extracted");
    domains
}

fn host_of(candidate: &[u8]) -> Result<Option<String>, AnalysisError> {
    // the pattern only admits ASCII
    let candidate = std::str::from_utf8(candidate)
        .map_err(|e| AnalysisError::Parse(format!("URL candidate: {}", e)))?;
    let url = Url::parse(candidate)
        .map_err(|e| AnalysisError::Parse(format!("URL '{}': {}", candidate, e)))?;
    Ok(url
        .host_str()
        .filter(|host| !host.is_empty())
        .map(String::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(body: &str, origin: &str) -> Vec<String> {
        extract_third_party_domains(body.as_bytes(), origin)
            .into_iter()
            .collect()
    }

    #[test]
    fn origin_host_and_duplicates_are_dropped() {
        assert_eq!(
            extract(
                "https://example.com/x https://example.com/y http://other.org/z",
                "example.com"
            ),
            vec!["other.org"]
        );
        assert_eq!(
            extract(
                r#"<script src="https://cdn.a.net/x.js"></script><img src='http://cdn.a.net/y.png'>"#,
                "example.com"
            ),
            vec!["cdn.a.net"]
        );
    }

    #[test]
    fn subdomains_of_the_origin_are_third_party() {
        assert_eq!(
            extract(
                "https://example.com/ https://static.example.com/app.js",
                "example.com"
            ),
            vec!["static.example.com"]
        );
    }

    #[test]
    fn host_stops_at_first_character_outside_the_class() {
        assert_eq!(
            extract(
                r#""https://fonts.googleapis.com/css?family=Roboto" http://tracker.io:8080/p"#,
                "example.com"
            ),
            vec!["fonts.googleapis.com", "tracker.io"]
        );
    }

    #[test]
    fn hosts_are_compared_after_url_normalization() {
        assert_eq!(
            extract("HTTPS://ignored.org https://CDN.Example.COM/", "cdn.example.com"),
            Vec::<String>::new()
        );
    }

    #[test]
    fn no_references_is_an_empty_set() {
        assert!(extract("<html><body>plain text, ftp://x.org</body></html>", "a.com").is_empty());
        assert!(extract_third_party_domains(&[0xff, 0xfe, 0x00], "a.com").is_empty());
    }

    #[test]
    fn unparseable_matches_are_skipped() {
        assert_eq!(
            extract("http://256.256.256.256/ https://ok.org", "example.com"),
            vec!["ok.org"]
        );
    }

    #[test]
    fn binary_noise_around_matches_is_tolerated() {
        let mut body = vec![0xff, 0xc3];
        body.extend_from_slice(b"https://cdn.b.org/");
        body.push(0x80);
        assert_eq!(
            extract_third_party_domains(&body, "example.com")
                .into_iter()
                .collect::<Vec<_>>(),
            vec!["cdn.b.org"]
        );
    }
}
