use url::Url;

/// Canonical domain of `raw_url`: the hostname, lowercased, with a leading
/// `"www."` stripped. URLs that do not parse or carry no host (`about:blank`,
/// `data:` URIs) yield an empty string, which matches no blocklist entry.
pub fn canonicalize(raw_url: &str) -> String {
    let Ok(parsed) = Url::parse(raw_url) else {
        return String::new();
    };

    let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

/// First blocklist entry that `domain` equals or is a subdomain of.
///
/// Subdomains bucket into the parent entry: `sub.example.com` matches
/// `example.com`. Blocklist order breaks ties, though well-formed lists
/// should not contain overlapping entries.
pub fn match_blocked<'a>(domain: &str, blocked_sites: &'a [String]) -> Option<&'a str> {
    if domain.is_empty() {
        return None;
    }

    blocked_sites
        .iter()
        .map(String::as_str)
        .find(|site| domain == *site || domain.ends_with(&format!(".{site}")))
}
