use serde::de;
use serde::{Deserialize, Deserializer, Serialize};

use regex::{Regex, RegexBuilder};
use reqwest::header::{HeaderMap, SET_COOKIE};
use scraper::{Html, Selector};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AnalysisError, Result};
use crate::fetch::Cookie;

// The build.rs build script reads the local data/apps.json file at build time
// and includes the text string as a constant in a created 'apps.json.rs'
// in the build dir. Here, we include this constant.
include!(concat!(env!("OUT_DIR"), "/apps.json.rs"));

lazy_static! {
    static ref EMBEDDED_CORPUS: std::result::Result<Arc<Corpus>, String> =
        Corpus::from_json(APPS_JSON_TEXT)
            .map(Arc::new)
            .map_err(|e| e.to_string());
    static ref META_SELECTOR: Selector =
        Selector::parse("meta[content]").expect("valid meta selector");
    static ref SCRIPT_SELECTOR: Selector =
        Selector::parse("script[src]").expect("valid script selector");
}

/// A technology that is found on a page
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Serialize, Deserialize)]
pub struct Tech {
    pub name: String,
    pub category: Option<String>,
}

impl fmt::Display for Tech {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.category {
            Some(category) => write!(f, "{} ({})", self.name, category),
            None => f.write_str(&self.name),
        }
    }
}

/// The on-disk shape of a signature file (Wappalyzer's apps.json).
#[derive(Debug, Deserialize)]
struct AppsJsonData {
    apps: HashMap<String, App>,
    #[serde(default)]
    categories: HashMap<u32, Category>,
}

#[derive(Debug, Deserialize)]
struct Category {
    name: String,
}

#[derive(Debug, Deserialize)]
struct App {
    #[serde(default)]
    cats: Vec<u32>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(deserialize_with = "one_or_more_strings")]
    #[serde(default)]
    html: Vec<String>,
    #[serde(default)]
    cookies: HashMap<String, String>,
    #[serde(default)]
    #[serde(alias = "scriptSrc")]
    #[serde(deserialize_with = "one_or_more_strings")]
    script: Vec<String>,
    #[serde(default)]
    meta: HashMap<String, String>,
    #[serde(deserialize_with = "one_or_more_strings")]
    #[serde(default)]
    implies: Vec<String>,
}

/// How a single pattern string from the signature file is evaluated.
#[derive(Debug)]
enum Pattern {
    /// Empty pattern: the keyed header/cookie/meta only has to be present.
    Exists,
    /// No regex metacharacters, lowercased for a case-insensitive `contains`.
    Contains(String),
    Regex(Regex),
}

impl Pattern {
    /// `None` when the pattern does not compile.
    fn compile(raw: &str) -> Option<Pattern> {
        // "\;" starts the version/confidence tags, which we don't use
        let raw = strip_tags(raw);
        if raw.is_empty() {
            return Some(Pattern::Exists);
        }
        if regex::escape(raw) == raw {
            return Some(Pattern::Contains(raw.to_lowercase()));
        }
        match RegexBuilder::new(raw).case_insensitive(true).build() {
            Ok(re) => Some(Pattern::Regex(re)),
            Err(err) => {
                warn!(pattern = raw, error = %err, "dropping signature pattern that does not compile");
                None
            }
        }
    }

    fn is_match(&self, text: &str) -> bool {
        match self {
            Pattern::Exists => true,
            Pattern::Contains(needle) => text.to_lowercase().contains(needle.as_str()),
            Pattern::Regex(re) => re.is_match(text),
        }
    }
}

#[derive(Debug)]
enum Rule {
    Header(String, Pattern),
    Html(Pattern),
    Cookie(String, Pattern),
    Script(Pattern),
    Meta(String, Pattern),
}

impl Rule {
    fn is_match(&self, page: &PageData) -> bool {
        match self {
            Rule::Header(name, pattern) => page
                .headers
                .get_all(name.as_str())
                .iter()
                .filter_map(|v| v.to_str().ok())
                .any(|v| pattern.is_match(v)),
            Rule::Html(Pattern::Contains(needle)) => {
                page.html_lowercase.contains(needle.as_str())
            }
            Rule::Html(pattern) => pattern.is_match(&page.html),
            Rule::Cookie(name, pattern) => page
                .cookies
                .iter()
                .filter(|c| c.name == *name)
                .any(|c| pattern.is_match(&c.value)),
            Rule::Script(pattern) => page.script_tags.iter().any(|src| pattern.is_match(src)),
            Rule::Meta(name, pattern) => page
                .meta_tags
                .get(name)
                .map_or(false, |content| pattern.is_match(content)),
        }
    }
}

/// One technology with its compiled rules.
#[derive(Debug)]
struct Signature {
    tech: Tech,
    rules: Vec<Rule>,
    implies: Vec<String>,
}

impl Signature {
    // Only presence matters, so the first hit decides.
    fn check(&self, page: &PageData) -> bool {
        self.rules.iter().any(|rule| rule.is_match(page))
    }
}

/// The response data signatures are evaluated against.
#[derive(Debug)]
struct PageData<'a> {
    headers: &'a HeaderMap,
    cookies: Vec<Cookie>,
    /// Keyed by lowercased `name` or `property`.
    meta_tags: HashMap<String, String>,
    script_tags: Vec<String>,
    html: String,
    /// `html`, lowercased once for the plain-text html rules.
    html_lowercase: String,
}

impl<'a> PageData<'a> {
    fn new(headers: &'a HeaderMap, body: &[u8]) -> PageData<'a> {
        let html = String::from_utf8_lossy(body).into_owned();
        let document = Html::parse_document(&html);

        let mut meta_tags = HashMap::new();
        for element in document.select(&META_SELECTOR) {
            let el = element.value();
            let key = el.attr("name").or_else(|| el.attr("property"));
            if let (Some(key), Some(content)) = (key, el.attr("content")) {
                meta_tags
                    .entry(key.to_lowercase())
                    .or_insert_with(|| content.to_string());
            }
        }

        let script_tags = document
            .select(&SCRIPT_SELECTOR)
            .filter_map(|element| element.value().attr("src"))
            .map(String::from)
            .collect();

        PageData {
            headers,
            cookies: cookies_from_headers(headers),
            meta_tags,
            script_tags,
            html_lowercase: html.to_lowercase(),
            html,
        }
    }
}

/// Name/value pairs of every `Set-Cookie` header, attributes ignored.
fn cookies_from_headers(headers: &HeaderMap) -> Vec<Cookie> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| {
            let pair = v.split(';').next().unwrap_or_default();
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                None
            } else {
                Some(Cookie::new(name, value.trim()))
            }
        })
        .collect()
}

/// A compiled, read-only technology signature corpus.
#[derive(Debug)]
pub struct Corpus {
    signatures: Vec<Signature>,
    by_name: HashMap<String, usize>,
}

impl Corpus {
    /// The corpus bundled into the binary, parsed once per process.
    pub fn embedded() -> Result<Arc<Corpus>> {
        EMBEDDED_CORPUS
            .as_ref()
            .map(Arc::clone)
            .map_err(|e| AnalysisError::CorpusLoad(e.clone()))
    }

    pub fn from_path(path: &Path) -> Result<Corpus> {
        let text = fs::read_to_string(path)
            .map_err(|e| AnalysisError::CorpusLoad(format!("{}: {}", path.display(), e)))?;
        Corpus::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Corpus> {
        let data: AppsJsonData =
            serde_json::from_str(text).map_err(|e| AnalysisError::CorpusLoad(e.to_string()))?;

        let mut names = data.apps.keys().cloned().collect::<Vec<_>>();
        names.sort();

        let mut signatures = Vec::with_capacity(names.len());
        let mut by_name = HashMap::with_capacity(names.len());
        for name in names {
            let app = &data.apps[&name];
            let category = app
                .cats
                .first()
                .and_then(|id| data.categories.get(id))
                .map(|c| c.name.clone());
            by_name.insert(name.clone(), signatures.len());
            signatures.push(Signature {
                tech: Tech { name, category },
                rules: compile_rules(app),
                implies: app.implies.iter().map(|i| strip_tags(i).to_string()).collect(),
            });
        }

        debug!(technologies = signatures.len(), "technology corpus compiled");
        Ok(Corpus {
            signatures,
            by_name,
        })
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Technologies whose rules match the response, plus everything they imply.
    pub fn fingerprint(&self, headers: &HeaderMap, body: &[u8]) -> BTreeSet<Tech> {
        self.fingerprint_page(&PageData::new(headers, body))
    }

    fn fingerprint_page(&self, page: &PageData) -> BTreeSet<Tech> {
        let mut detected = HashSet::new();
        let mut pending = Vec::new();
        for (idx, signature) in self.signatures.iter().enumerate() {
            if signature.check(page) {
                debug!(tech = %signature.tech.name, "technology matched");
                detected.insert(idx);
                pending.push(idx);
            }
        }

        while let Some(idx) = pending.pop() {
            for implied in &self.signatures[idx].implies {
                match self.by_name.get(implied) {
                    Some(&implied_idx) => {
                        if detected.insert(implied_idx) {
                            pending.push(implied_idx);
                        }
                    }
                    None => debug!(tech = %implied, "implied technology not in corpus"),
                }
            }
        }

        detected
            .into_iter()
            .map(|idx| self.signatures[idx].tech.clone())
            .collect()
    }
}

fn compile_rules(app: &App) -> Vec<Rule> {
    let mut rules = vec![];

    let mut headers = app.headers.iter().collect::<Vec<_>>();
    headers.sort();
    for (name, raw) in headers {
        if let Some(p) = Pattern::compile(raw) {
            rules.push(Rule::Header(name.to_lowercase(), p));
        }
    }

    rules.extend(app.html.iter().filter_map(|raw| Pattern::compile(raw)).map(Rule::Html));

    let mut cookies = app.cookies.iter().collect::<Vec<_>>();
    cookies.sort();
    for (name, raw) in cookies {
        if let Some(p) = Pattern::compile(raw) {
            rules.push(Rule::Cookie(name.clone(), p));
        }
    }

    rules.extend(app.script.iter().filter_map(|raw| Pattern::compile(raw)).map(Rule::Script));

    let mut meta = app.meta.iter().collect::<Vec<_>>();
    meta.sort();
    for (name, raw) in meta {
        if let Some(p) = Pattern::compile(raw) {
            rules.push(Rule::Meta(name.to_lowercase(), p));
        }
    }

    rules
}

fn strip_tags(raw: &str) -> &str {
    raw.split("\\;").next().unwrap_or_default()
}

fn one_or_more_strings<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec(PhantomData<Vec<String>>);

    impl<'de> de::Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("string or list of strings")
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![value.to_owned()])
        }

        fn visit_seq<S>(self, visitor: S) -> std::result::Result<Self::Value, S::Error>
        where
            S: de::SeqAccess<'de>,
        {
            Deserialize::deserialize(de::value::SeqAccessDeserializer::new(visitor))
        }
    }

    deserializer.deserialize_any(StringOrVec(PhantomData))
}
