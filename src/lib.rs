#[macro_use]
extern crate lazy_static;

pub mod config;
pub mod domains;
pub mod error;
pub mod fetch;
pub mod report;
pub mod security;
pub mod target;
pub mod wapp;

use std::collections::BTreeSet;
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use config::{Config, FetchMode};
pub use error::{AnalysisError, Result};
pub use fetch::{Cookie, FetchResult};
pub use security::{HeaderPresence, SecurityReport};
pub use target::Target;
pub use wapp::{Corpus, Tech};

/// A facet's output, or the message explaining why it has none.
pub type FacetResult<T> = std::result::Result<T, String>;

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub url: String,
    pub technologies: FacetResult<BTreeSet<Tech>>,
    pub cookies: FacetResult<Vec<Cookie>>,
    pub third_party_domains: FacetResult<BTreeSet<String>>,
    pub security: FacetResult<SecurityReport>,
}

/// Runs the four facets against a site. Build once, analyze many.
pub struct SiteAnalyzer {
    config: Config,
    client: Client,
    corpus: std::result::Result<Arc<Corpus>, String>,
}

impl SiteAnalyzer {
    /// Uses `config.corpus_path` when set, the bundled corpus otherwise.
    ///
    /// A corpus that fails to load only disables the technology facet.
    pub fn new(config: Config) -> Result<SiteAnalyzer> {
        let corpus = match &config.corpus_path {
            Some(path) => Corpus::from_path(path).map(Arc::new),
            None => Corpus::embedded(),
        };
        let corpus = corpus.map_err(|err| {
            warn!(error = %err, "technology detection disabled");
            err.to_string()
        });
        SiteAnalyzer::build(config, corpus)
    }

    pub fn with_corpus(config: Config, corpus: Corpus) -> Result<SiteAnalyzer> {
        SiteAnalyzer::build(config, Ok(Arc::new(corpus)))
    }

    fn build(
        config: Config,
        corpus: std::result::Result<Arc<Corpus>, String>,
    ) -> Result<SiteAnalyzer> {
        config.validate()?;
        let client = fetch::build_client(&config)?;
        Ok(SiteAnalyzer {
            config,
            client,
            corpus,
        })
    }

    /// Only an invalid URL is an error; facet failures are carried in the `Analysis`.
    pub async fn analyze(&self, input: &str) -> Result<Analysis> {
        let target = Target::normalize(input)?;
        info!(url = %target, mode = ?self.config.fetch_mode, "analyzing site");

        let analysis = match self.config.fetch_mode {
            FetchMode::Shared => {
                let page = self.fetch(&target, "all facets").await;
                Analysis {
                    url: target.to_string(),
                    technologies: page
                        .as_ref()
                        .map_err(Clone::clone)
                        .and_then(|p| self.technologies(p)),
                    cookies: page.as_ref().map_err(Clone::clone).map(collect_cookies),
                    third_party_domains: page
                        .as_ref()
                        .map_err(Clone::clone)
                        .map(|p| find_third_party_domains(p, &target)),
                    security: page.as_ref().map_err(Clone::clone).map(|p| self.security(p)),
                }
            }
            FetchMode::PerFacet => {
                let (technologies, cookies, third_party_domains, security) = futures::join!(
                    self.technologies_facet(&target),
                    self.run_facet(&target, "cookies", |p| Ok(collect_cookies(p))),
                    self.run_facet(&target, "third-party domains", |p| {
                        Ok(find_third_party_domains(p, &target))
                    }),
                    self.run_facet(&target, "security", |p| Ok(self.security(p))),
                );
                Analysis {
                    url: target.to_string(),
                    technologies,
                    cookies,
                    third_party_domains,
                    security,
                }
            }
        };
        Ok(analysis)
    }

    async fn fetch(&self, target: &Target, facet: &str) -> FacetResult<FetchResult> {
        fetch::fetch(&self.client, target).await.map_err(|err| {
            let message = err.chain();
            warn!(facet = facet, error = %message, "fetch failed");
            message
        })
    }

    async fn run_facet<T, F>(&self, target: &Target, facet: &str, run: F) -> FacetResult<T>
    where
        F: FnOnce(&FetchResult) -> FacetResult<T>,
    {
        let page = self.fetch(target, facet).await?;
        run(&page)
    }

    async fn technologies_facet(&self, target: &Target) -> FacetResult<BTreeSet<Tech>> {
        // no point fetching without signatures
        self.corpus()?;
        self.run_facet(target, "technologies", |p| self.technologies(p))
            .await
    }

    fn corpus(&self) -> FacetResult<&Corpus> {
        self.corpus.as_deref().map_err(Clone::clone)
    }

    fn technologies(&self, page: &FetchResult) -> FacetResult<BTreeSet<Tech>> {
        let corpus = self.corpus()?;
        Ok(corpus.fingerprint(&page.headers, &page.body))
    }

    fn security(&self, page: &FetchResult) -> SecurityReport {
        security::check_security(page, &self.config.security_headers)
    }
}

fn collect_cookies(page: &FetchResult) -> Vec<Cookie> {
    page.cookies.clone()
}

fn find_third_party_domains(page: &FetchResult, target: &Target) -> BTreeSet<String> {
    domains::extract_third_party_domains(&page.body, target.host())
}
