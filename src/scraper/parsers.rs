use crate::models::ListingEntry;
use crate::scraper::cleaner::{clean_text, normalize_url};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

/// Elements an anti-bot interstitial puts on the page while it is active.
pub const CHALLENGE_SELECTOR: &str =
    r#"#cf-wrapper, .cf-spinner-container, #challenge-form, iframe[src*="challenges"]"#;

fn parse_selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            warn!("Bad selector {:?}: {:?}", css, e);
            None
        }
    }
}

// ── Table discovery ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSource {
    Primary,
    /// Largest table on the page, with its row count.
    Fallback { rows: usize },
}

#[derive(Debug)]
pub struct LocatedTable<'a> {
    pub table: ElementRef<'a>,
    pub source: TableSource,
}

/// Find the listing table: the primary selector first, else the table with the
/// most rows, provided it has at least `min_rows`. Ties keep the earliest table.
pub fn locate_table<'a>(doc: &'a Html, primary: &str, min_rows: usize) -> Option<LocatedTable<'a>> {
    if let Some(sel) = parse_selector(primary) {
        if let Some(table) = doc.select(&sel).next() {
            return Some(LocatedTable { table, source: TableSource::Primary });
        }
    }

    let table_sel = parse_selector("table")?;
    let tr_sel = parse_selector("tr")?;

    let mut best: Option<(ElementRef<'a>, usize)> = None;
    for table in doc.select(&table_sel) {
        let rows = table.select(&tr_sel).count();
        if best.is_none_or(|(_, max)| rows > max) {
            best = Some((table, rows));
        }
    }

    match best {
        Some((table, rows)) if rows >= min_rows => {
            debug!("Fallback table has {} rows", rows);
            Some(LocatedTable { table, source: TableSource::Fallback { rows } })
        }
        Some((_, rows)) => {
            warn!("Largest table has {} rows, need {}", rows, min_rows);
            None
        }
        None => None,
    }
}

// ── Row extraction ────────────────────────────────────────────────────────────

/// Pull `{name, detail_url}` from the first link in each row's second cell.
/// Rows lacking that cell, a link, a name or an href are skipped.
pub fn extract_rows(table: ElementRef<'_>, base_origin: &str) -> Vec<ListingEntry> {
    let (Some(tr_sel), Some(td_sel), Some(a_sel)) =
        (parse_selector("tr"), parse_selector("td"), parse_selector("a"))
    else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for (i, tr) in table.select(&tr_sel).enumerate() {
        let Some(cell) = tr.select(&td_sel).nth(1) else {
            continue;
        };
        let Some(link) = cell.select(&a_sel).next() else {
            continue;
        };

        let name = clean_text(link.text());
        let href = link.value().attr("href").unwrap_or_default();
        if name.is_empty() || href.trim().is_empty() {
            debug!("Row {}: missing name or href", i + 1);
            continue;
        }

        let Some(detail_url) = normalize_url(href, base_origin) else {
            debug!("Row {}: unusable href {:?}", i + 1, href);
            continue;
        };
        entries.push(ListingEntry { name, detail_url });
    }
    entries
}

// ── Detail page ───────────────────────────────────────────────────────────────

/// Absolute target of the first anchor whose visible text equals `marker`.
pub fn find_marker_link(doc: &Html, marker: &str, base_origin: &str) -> Option<String> {
    let a_sel = parse_selector("a")?;
    let marker = marker.trim();
    let anchor = doc.select(&a_sel).find(|a| clean_text(a.text()) == marker)?;
    let href = anchor.value().attr("href")?;
    normalize_url(href, base_origin)
}

/// True while an anti-bot challenge is still on the page.
pub fn has_challenge(doc: &Html) -> bool {
    parse_selector(CHALLENGE_SELECTOR)
        .is_some_and(|sel| doc.select(&sel).next().is_some())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://www.lyngsat.com";

    fn rows(n: usize) -> String {
        (0..n)
            .map(|i| format!(r#"<tr><td>{i}</td><td><a href="/tv/{i}.html">Ch {i}</a></td></tr>"#))
            .collect()
    }

    #[test]
    fn test_primary_selector_wins() {
        let html = format!(
            r#"<table id="big">{}</table><table id="main">{}</table>"#,
            rows(20),
            rows(2)
        );
        let doc = Html::parse_document(&html);
        let found = locate_table(&doc, "table#main", 5).unwrap();
        assert_eq!(found.source, TableSource::Primary);
        assert_eq!(found.table.value().attr("id"), Some("main"));
    }

    #[test]
    fn test_fallback_picks_largest_table() {
        let html = format!(
            r#"<table id="a">{}</table><table id="b">{}</table><table id="c">{}</table>"#,
            rows(3),
            rows(9),
            rows(6)
        );
        let doc = Html::parse_document(&html);
        let found = locate_table(&doc, "table#missing", 5).unwrap();
        assert_eq!(found.source, TableSource::Fallback { rows: 9 });
        assert_eq!(found.table.value().attr("id"), Some("b"));
    }

    #[test]
    fn test_fallback_below_threshold_fails() {
        let html = format!(r#"<table>{}</table><table>{}</table>"#, rows(4), rows(2));
        let doc = Html::parse_document(&html);
        assert!(locate_table(&doc, "table#missing", 5).is_none());

        let empty = Html::parse_document("<p>no tables</p>");
        assert!(locate_table(&empty, "table#missing", 1).is_none());
    }

    #[test]
    fn test_invalid_primary_selector_uses_fallback() {
        let doc = Html::parse_document(&format!("<table>{}</table>", rows(5)));
        let found = locate_table(&doc, "table >>> ???", 5).unwrap();
        assert_eq!(found.source, TableSource::Fallback { rows: 5 });
    }

    #[test]
    fn test_extract_rows_skips_sparse_rows() {
        let html = r#"<table>
            <tr><td>1</td><td><a href="/tv/a.html"> Alpha </a></td></tr>
            <tr><td>only one cell</td></tr>
            <tr><td>2</td><td>no link here</td></tr>
            <tr><td>3</td><td><a href="/tv/c.html">   </a></td></tr>
            <tr><td>4</td><td><a>No href</a></td></tr>
            <tr><td>5</td><td><a href="">Empty href</a></td></tr>
            <tr><td>6</td><td><a href="https://mirror.test/b.html">Beta</a><a href="/x">Second</a></td></tr>
        </table>"#;
        let doc = Html::parse_document(html);
        let table = locate_table(&doc, "table", 1).unwrap().table;

        let entries = extract_rows(table, ORIGIN);
        assert_eq!(
            entries,
            vec![
                ListingEntry {
                    name: "Alpha".into(),
                    detail_url: "https://www.lyngsat.com/tv/a.html".into(),
                },
                ListingEntry {
                    name: "Beta".into(),
                    detail_url: "https://mirror.test/b.html".into(),
                },
            ]
        );
    }

    #[test]
    fn test_marker_link_requires_exact_text() {
        let html = r#"
            <a href="/s/wrong">Linear Streaming (backup)</a>
            <a href="/s/a"> Linear
               Streaming </a>
            <a href="/s/late">Linear Streaming</a>"#;
        let doc = Html::parse_document(html);
        assert_eq!(
            find_marker_link(&doc, "Linear Streaming", ORIGIN).as_deref(),
            Some("https://www.lyngsat.com/s/a")
        );
        assert_eq!(find_marker_link(&doc, "Satellite", ORIGIN), None);
    }

    #[test]
    fn test_marker_without_href_is_unresolved() {
        let doc = Html::parse_document("<a>Linear Streaming</a>");
        assert_eq!(find_marker_link(&doc, "Linear Streaming", ORIGIN), None);
    }

    #[test]
    fn test_challenge_detection() {
        let blocked = Html::parse_document(r#"<div id="cf-wrapper">checking</div>"#);
        let framed =
            Html::parse_document(r#"<iframe src="https://x.test/challenges/1"></iframe>"#);
        let clear = Html::parse_document("<table></table>");
        assert!(has_challenge(&blocked));
        assert!(has_challenge(&framed));
        assert!(!has_challenge(&clear));
    }
}
