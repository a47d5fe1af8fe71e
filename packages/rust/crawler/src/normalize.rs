//! Canonical domain keys.
//!
//! Every domain comparison in the crawler goes through [`normalize_domain`]:
//! `HTTP://WWW.Example.tn/path?q=1` and `https://example.tn` share the key
//! `https://example.tn`.

use url::{Host, Url};

/// Reduce an absolute URL to its canonical `https://host` key.
///
/// Returns `None` for anything that is not an absolute http(s) URL with a
/// non-empty host. Port, path, query, fragment and credentials are dropped,
/// the host is lowercased and a leading `www.` is stripped.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = match url.host()? {
        Host::Domain(domain) => domain.to_lowercase(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => format!("[{ip}]"),
    };
    let host = host.strip_prefix("www.").unwrap_or(&host).trim_end_matches('.');
    if host.is_empty() {
        return None;
    }

    Some(format!("https://{host}"))
}

/// Resolve `href` against `base` and normalize it.
///
/// Non-navigational hrefs (`javascript:`, `mailto:`, `tel:`, fragments) yield `None`.
pub fn normalize_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    let lower = href.to_ascii_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
    {
        return None;
    }

    let resolved = base.join(href).ok()?;
    normalize_domain(resolved.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_case_www_and_slash_collapse() {
        let expected = Some("https://example.tn".to_string());
        assert_eq!(normalize_domain("HTTP://WWW.Example.tn/"), expected);
        assert_eq!(normalize_domain("https://example.tn"), expected);
        assert_eq!(normalize_domain("http://www.example.tn"), expected);
        assert_eq!(normalize_domain("  https://example.tn/annonces?page=2#top "), expected);
    }

    #[test]
    fn port_and_credentials_are_dropped() {
        assert_eq!(
            normalize_domain("http://user:pw@immo.tn:8080/x").as_deref(),
            Some("https://immo.tn")
        );
    }

    #[test]
    fn only_leading_www_is_stripped() {
        assert_eq!(
            normalize_domain("https://shop.www.tn").as_deref(),
            Some("https://shop.www.tn")
        );
        assert_eq!(
            normalize_domain("https://wwwimmo.tn").as_deref(),
            Some("https://wwwimmo.tn")
        );
    }

    #[test]
    fn invalid_input_yields_none() {
        assert_eq!(normalize_domain(""), None);
        assert_eq!(normalize_domain("not a url"), None);
        assert_eq!(normalize_domain("example.tn"), None);
        assert_eq!(normalize_domain("/relative/path"), None);
        assert_eq!(normalize_domain("mailto:agence@immo.tn"), None);
        assert_eq!(normalize_domain("ftp://files.immo.tn"), None);
        assert_eq!(normalize_domain("https://www."), None);
    }

    #[test]
    fn links_resolve_against_page() {
        let base = Url::parse("https://agence.tn/biens/").unwrap();
        assert_eq!(
            normalize_link(&base, "//www.Tayara.tn/ads").as_deref(),
            Some("https://tayara.tn")
        );
        assert_eq!(
            normalize_link(&base, "/contact").as_deref(),
            Some("https://agence.tn")
        );
        assert_eq!(normalize_link(&base, "javascript:void(0)"), None);
        assert_eq!(normalize_link(&base, "tel:+21671000000"), None);
        assert_eq!(normalize_link(&base, "#gallery"), None);
    }
}
