//! Web page link extraction.
//!
//! Fetching and parsing are split so [`extract`] can run against any HTML
//! string; [`ExtractLinks`] adds the HTTP fetch around it.

use std::{sync::OnceLock, time::Duration};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::{parse_args, EntryPoint, Parameters, UnitError};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

fn default_max_links() -> i64 {
    50
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkFilters {
    pub max_links: i64,
    pub filter_internal: bool,
    pub filter_external: bool,
    pub include_emails: bool,
}

impl Default for LinkFilters {
    fn default() -> Self {
        Self {
            max_links: default_max_links(),
            filter_internal: false,
            filter_external: false,
            include_emails: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExtractArgs {
    url: String,
    #[serde(default = "default_max_links")]
    max_links: i64,
    #[serde(default)]
    filter_internal: bool,
    #[serde(default)]
    filter_external: bool,
    #[serde(default = "enabled")]
    include_emails: bool,
}

impl ExtractArgs {
    fn filters(&self) -> LinkFilters {
        LinkFilters {
            max_links: self.max_links,
            filter_internal: self.filter_internal,
            filter_external: self.filter_external,
            include_emails: self.include_emails,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Internal,
    External,
    Email,
}

#[derive(Debug, Clone, Serialize)]
pub struct Link {
    pub url: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: LinkKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    pub url: String,
    pub page_title: String,
    pub page_description: String,
    pub total_links_found: usize,
    pub links_returned: usize,
    pub email_links_returned: usize,
    pub internal_links_count: usize,
    pub external_links_count: usize,
    pub links: Vec<Link>,
    pub email_links: Vec<Link>,
    pub filters_applied: LinkFilters,
}

pub struct ExtractLinks;

#[async_trait]
impl EntryPoint for ExtractLinks {
    async fn call(&self, params: Parameters) -> Result<Value, UnitError> {
        let args: ExtractArgs = parse_args(params)?;
        let base = normalize_url(&args.url)?;

        let html = fetch(&base)
            .await
            .map_err(|err| UnitError::failed(format!("Failed to fetch webpage: {err}")))?;
        debug!(url = %base, bytes = html.len(), "fetched page for link extraction");

        let report = extract(&html, &base, &args.filters());
        serde_json::to_value(report)
            .map_err(|err| UnitError::failed(format!("Error processing webpage: {err}")))
    }
}

async fn fetch(url: &Url) -> Result<String, reqwest::Error> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .build()?;
    client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

/// Trims the input and assumes `https://` when no scheme is given.
pub fn normalize_url(raw: &str) -> Result<Url, UnitError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UnitError::failed("URL cannot be empty"));
    }
    let candidate = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    Url::parse(&candidate)
        .map_err(|err| UnitError::failed(format!("Error processing webpage: invalid URL: {err}")))
}

pub fn extract(html: &str, base: &Url, filters: &LinkFilters) -> LinkReport {
    let base_domain = netloc(base);
    let mut total_links_found = 0;
    let mut links = Vec::new();
    let mut email_links = Vec::new();

    for anchor in anchor_re().captures_iter(html) {
        let Some(href) = attribute(&anchor[1], "href") else {
            continue;
        };
        total_links_found += 1;

        let href = href.trim();
        if href.is_empty() {
            continue;
        }
        let text = clean_text(&anchor[2]);
        let text = if text.is_empty() {
            "No text".to_string()
        } else {
            text
        };

        if href.starts_with("mailto:") {
            if filters.include_emails {
                email_links.push(Link {
                    url: href.to_string(),
                    text,
                    kind: LinkKind::Email,
                    domain: None,
                });
            }
            continue;
        }

        let Ok(full) = base.join(href) else {
            continue;
        };
        let domain = netloc(&full);
        let is_internal = domain.is_empty() || domain == base_domain;

        if filters.filter_internal && !is_internal {
            continue;
        }
        if filters.filter_external && is_internal {
            continue;
        }
        if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("tel:") {
            continue;
        }

        links.push(Link {
            url: full.to_string(),
            text,
            kind: if is_internal {
                LinkKind::Internal
            } else {
                LinkKind::External
            },
            domain: Some(if domain.is_empty() {
                base_domain.clone()
            } else {
                domain
            }),
        });
    }

    if filters.max_links > 0 {
        let max = usize::try_from(filters.max_links).unwrap_or(usize::MAX);
        links.truncate(max);
        email_links.truncate(max / 2);
    }

    let internal_links_count = links
        .iter()
        .filter(|link| link.kind == LinkKind::Internal)
        .count();
    let external_links_count = links.len() - internal_links_count;

    LinkReport {
        url: base.to_string(),
        page_title: page_title(html).unwrap_or_else(|| "No title".to_string()),
        page_description: page_description(html).unwrap_or_else(|| "No description".to_string()),
        total_links_found,
        links_returned: links.len(),
        email_links_returned: email_links.len(),
        internal_links_count,
        external_links_count,
        links,
        email_links,
        filters_applied: filters.clone(),
    }
}

/// Host plus explicit port, empty for URLs without an authority.
fn netloc(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

fn page_title(html: &str) -> Option<String> {
    let captures = title_re().captures(html)?;
    let title = clean_text(&captures[1]);
    (!title.is_empty()).then_some(title)
}

fn page_description(html: &str) -> Option<String> {
    meta_re().captures_iter(html).find_map(|meta| {
        let attrs = &meta[1];
        let name = attribute(attrs, "name")?;
        if !name.eq_ignore_ascii_case("description") {
            return None;
        }
        Some(
            attribute(attrs, "content")
                .map(decode_entities)
                .unwrap_or_else(|| "No description".to_string()),
        )
    })
}

fn attribute<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    attr_re().captures_iter(attrs).find_map(|attr| {
        if !attr[1].eq_ignore_ascii_case(name) {
            return None;
        }
        attr.get(2)
            .or_else(|| attr.get(3))
            .or_else(|| attr.get(4))
            .map(|value| value.as_str())
    })
}

fn clean_text(fragment: &str) -> String {
    let without_tags = tag_re().replace_all(fragment, " ");
    let decoded = decode_entities(&without_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").expect("valid anchor regex"))
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("valid attribute regex")
    })
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").expect("valid title regex")
    })
}

fn meta_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<meta\b([^>]*)>").expect("valid meta regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"))
}

#[cfg(test)]
#[path = "tests/links_tests.rs"]
mod tests;
