//! Link extraction, URL canonicalization and domain containment.

use scraper::{Html, Selector};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

/// Same-domain and external links found on one page, each sorted and deduplicated
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkSet {
    pub internal: BTreeSet<String>,
    pub external: BTreeSet<String>,
}

/// Canonical form `scheme://host[:port]/path`, with query, fragment and any
/// trailing slash removed. The root path collapses to `scheme://host[:port]`.
pub fn canonicalize(url: &Url) -> String {
    let mut canonical = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        canonical.push_str(&format!(":{}", port));
    }
    canonical.push_str(url.path());
    canonical.trim_end_matches('/').to_string()
}

/// Exact-or-subdomain match. `evil-example.com` is not contained in `example.com`.
pub fn is_domain_contained(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Resolve an `href` against the page URL, skipping non-navigational schemes
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let resolved = base.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}

/// Split every anchor on an already-parsed document into same-domain and external links
pub fn partition_document_links(document: &Html, base_url: &Url, domain: &str) -> LinkSet {
    let mut links = LinkSet::default();

    for element in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(resolved) = resolve_href(base_url, href) else {
            continue;
        };

        let canonical = canonicalize(&resolved);
        let contained = resolved
            .host_str()
            .map(|host| is_domain_contained(host, domain))
            .unwrap_or(false);

        if contained {
            links.internal.insert(canonical);
        } else {
            debug!("External link: {} (domain: {})", canonical, domain);
            links.external.insert(canonical);
        }
    }

    links
}

/// Parse `body` and partition its links
pub fn partition_links(body: &str, base_url: &Url, domain: &str) -> LinkSet {
    let document = Html::parse_document(body);
    partition_document_links(&document, base_url, domain)
}

/// Same-domain canonical links on a page, in sorted order
pub fn extract_links(body: &str, base_url: &Url, domain: &str) -> BTreeSet<String> {
    partition_links(body, base_url, domain).internal
}
