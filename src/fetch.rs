use reqwest::header::HeaderMap;
use reqwest::{redirect, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AnalysisError, Result};
use crate::target::Target;

// Upper bound on what a Content-Length header can make us allocate up front.
const MAX_PREALLOC: usize = 8 * 1024 * 1024;

/// A very simple representation for cookie data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl Cookie {
    pub fn new(name: &str, value: &str) -> Cookie {
        Cookie {
            name: name.to_string(),
            value: value.to_string(),
            secure: false,
            http_only: false,
        }
    }
}

/// Everything one GET produced. Facets only ever borrow it.
#[derive(Debug)]
pub struct FetchResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Scheme of the final URL, after redirects.
    pub scheme: String,
    /// Host of the final URL, after redirects.
    pub host: String,
    /// In `Set-Cookie` order, same-name cookies included.
    pub cookies: Vec<Cookie>,
}

pub fn build_client(config: &Config) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(redirect::Policy::limited(config.max_redirects));
    if !config.system_proxy {
        builder = builder.no_proxy();
    }
    builder.build().map_err(AnalysisError::Client)
}

pub async fn fetch(client: &Client, target: &Target) -> Result<FetchResult> {
    let fetch_error = |source| AnalysisError::Fetch {
        url: target.to_string(),
        source,
    };

    info!(url = %target, "fetching");
    let mut response = client
        .get(target.url().clone())
        .send()
        .await
        .map_err(fetch_error)?;

    let status = response.status();
    let headers = response.headers().clone();
    let scheme = response.url().scheme().to_string();
    let host = response.url().host_str().unwrap_or_default().to_string();
    let cookies = response
        .cookies()
        .map(|c| Cookie {
            name: c.name().to_string(),
            value: c.value().to_string(),
            secure: c.secure(),
            http_only: c.http_only(),
        })
        .collect::<Vec<_>>();

    // drain the whole body, even when a facet only needs headers
    let mut body = match response.content_length() {
        Some(len) => Vec::with_capacity((len as usize).min(MAX_PREALLOC)),
        None => Vec::new(),
    };
    while let Some(chunk) = response.chunk().await.map_err(fetch_error)? {
        body.extend_from_slice(&chunk);
    }

    debug!(
        url = %target,
        %status,
        final_scheme = %scheme,
        final_host = %host,
        bytes = body.len(),
        cookies = cookies.len(),
        "fetched"
    );

    Ok(FetchResult {
        status,
        headers,
        body,
        scheme,
        host,
        cookies,
    })
}
