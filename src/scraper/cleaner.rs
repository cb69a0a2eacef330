use tracing::warn;
use url::Url;

// ── Text ──────────────────────────────────────────────────────────────────────

/// Collapse whitespace runs to single spaces and trim, approximating rendered text.
/// "  CCTV-1\n  综合 " → "CCTV-1 综合"
pub fn clean_text<'a>(fragments: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for word in fragments.into_iter().flat_map(str::split_whitespace) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

// ── URLs ──────────────────────────────────────────────────────────────────────

fn is_absolute(href: &str) -> bool {
    let lower = href.get(..8).unwrap_or(href).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Make `href` absolute against `base_origin`.
/// "/detail/123" → "https://host/detail/123" | absolute hrefs pass through unchanged.
/// Returns `None` for empty hrefs or ones that cannot be joined.
pub fn normalize_url(href: &str, base_origin: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if is_absolute(href) {
        return Some(href.to_string());
    }

    let base = match Url::parse(&format!("{}/", base_origin.trim_end_matches('/'))) {
        Ok(base) => base,
        Err(e) => {
            warn!("Unusable base origin {:?}: {}", base_origin, e);
            return None;
        }
    };
    base.join(href).ok().map(String::from)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://www.lyngsat.com";

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text(["  CCTV-1 ", "\n  News "]), "CCTV-1 News");
        assert_eq!(clean_text(["   "]), "");
        assert_eq!(clean_text(Vec::<&str>::new()), "");
    }

    #[test]
    fn test_relative_href_gets_origin() {
        assert_eq!(
            normalize_url("/detail/123", ORIGIN).as_deref(),
            Some("https://www.lyngsat.com/detail/123")
        );
        assert_eq!(
            normalize_url("detail/123", "https://www.lyngsat.com/").as_deref(),
            Some("https://www.lyngsat.com/detail/123")
        );
    }

    #[test]
    fn test_absolute_href_passes_through() {
        let href = "http://cdn.example.test/Live%20TV/a.m3u8?x=1";
        assert_eq!(normalize_url(href, ORIGIN).as_deref(), Some(href));
        assert_eq!(
            normalize_url("HTTPS://Other.test/x", ORIGIN).as_deref(),
            Some("HTTPS://Other.test/x")
        );
    }

    #[test]
    fn test_empty_href_is_rejected() {
        assert_eq!(normalize_url("   ", ORIGIN), None);
        assert_eq!(normalize_url("/x", "not an origin"), None);
    }
}
