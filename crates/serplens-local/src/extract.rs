use crate::{FetchOptions, LocalFetcher};
use serplens_core::{Error, ExtractedText, Result, TextExtractor};
use std::io::Cursor;

/// Convert HTML to readable plain text.
///
/// Deterministic and "good enough"; not a full readability engine.
pub fn html_to_text(html: &str, width: usize) -> String {
    html2text::from_read(Cursor::new(html.as_bytes()), width).unwrap_or_else(|_| html.to_string())
}

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn has_any_text(s: &str) -> bool {
    s.chars().any(|c| !c.is_whitespace())
}

/// Best-effort guess for whether bytes are HTML-ish.
pub fn bytes_look_like_html(bytes: &[u8]) -> bool {
    let mut i = 0usize;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return false;
    }
    let rest = &bytes[i..];
    let head = &rest[..rest.len().min(16)];
    let head_lc = head.to_ascii_lowercase();
    head_lc.starts_with(b"<!doctype")
        || head_lc.starts_with(b"<html")
        || head_lc.starts_with(b"<head")
        || head_lc.starts_with(b"<body")
        || head_lc.starts_with(b"<!--")
}

fn content_type_lc_prefix(ct: Option<&str>) -> String {
    ct.unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

fn strip_tag_blocks(html: &str, tag: &str) -> String {
    // Removes <tag ...> ... </tag> only when a close tag is found; ASCII-case-insensitive.
    let open_pat = format!("<{}", tag.to_ascii_lowercase());
    let close_pat = format!("</{}>", tag.to_ascii_lowercase());

    let mut out = String::new();
    let mut i = 0usize;
    let lower = html.to_ascii_lowercase();
    while let Some(rel_start) = lower[i..].find(&open_pat) {
        let start = i + rel_start;
        let after_open = start + open_pat.len();
        // Don't treat `<scripts>` or `<stylesheet>` as a match.
        let boundary_ok = lower[after_open..]
            .chars()
            .next()
            .is_some_and(|c| c == '>' || c.is_ascii_whitespace() || c == '/');
        if !boundary_ok {
            out.push_str(&html[i..after_open]);
            i = after_open;
            continue;
        }
        if let Some(rel_end) = lower[after_open..].find(&close_pat) {
            let end = after_open + rel_end + close_pat.len();
            out.push_str(&html[i..start]);
            out.push(' ');
            i = end;
        } else {
            break;
        }
    }
    out.push_str(&html[i..]);
    out
}

fn strip_non_content(html: &str) -> String {
    let mut s = html.to_string();
    for tag in ["script", "style", "noscript", "template", "svg"] {
        s = strip_tag_blocks(&s, tag);
    }
    s
}

fn class_or_id_lc(el: &html_scraper::ElementRef) -> String {
    let mut out = String::new();
    if let Some(c) = el.value().attr("class") {
        out.push_str(c);
        out.push(' ');
    }
    if let Some(i) = el.value().attr("id") {
        out.push_str(i);
    }
    out.to_ascii_lowercase()
}

fn is_boilerplate_container(el: &html_scraper::ElementRef) -> bool {
    let s = class_or_id_lc(el);
    if s.is_empty() {
        return false;
    }
    [
        "nav", "navbar", "menu", "sidebar", "footer", "cookie", "consent", "banner",
    ]
    .iter()
    .any(|bad| s.contains(bad))
}

fn element_text(el: &html_scraper::ElementRef) -> String {
    norm_ws(&el.text().collect::<Vec<_>>().join(" "))
}

/// Visible text of the page's main content.
///
/// Prefers the largest non-boilerplate `<main>`/`<article>`; otherwise the whole `<body>`.
pub fn html_main_text(html: &str) -> Option<String> {
    let cleaned = strip_non_content(html);
    let doc = html_scraper::Html::parse_document(&cleaned);

    let mut best: Option<String> = None;
    if let Ok(sel) = html_scraper::Selector::parse("main, article") {
        for el in doc.select(&sel) {
            if is_boilerplate_container(&el) {
                continue;
            }
            let t = element_text(&el);
            if best.as_ref().map_or(true, |b| t.len() > b.len()) {
                best = Some(t);
            }
        }
    }
    if let Some(b) = best.filter(|b| has_any_text(b)) {
        return Some(b);
    }

    let sel = html_scraper::Selector::parse("body").ok()?;
    let body = doc.select(&sel).next()?;
    let t = element_text(&body);
    has_any_text(&t).then_some(t)
}

/// Turn a fetched body into plain text, dispatching on content type.
pub fn text_from_bytes(bytes: &[u8], content_type: Option<&str>) -> Result<String> {
    let ct = content_type_lc_prefix(content_type);
    let is_html = ct == "text/html"
        || ct == "application/xhtml+xml"
        || (ct.is_empty() && bytes_look_like_html(bytes));
    if is_html {
        let html = String::from_utf8_lossy(bytes);
        let text = html_main_text(&html)
            .unwrap_or_else(|| norm_ws(&html_to_text(&strip_non_content(&html), 100)));
        return Ok(text);
    }
    if ct.is_empty() || ct.starts_with("text/") {
        return Ok(norm_ws(&String::from_utf8_lossy(bytes)));
    }
    Err(Error::NotSupported(format!("content type {ct}")))
}

/// Fetch a URL and extract its plain text.
#[derive(Debug, Clone)]
pub struct PageExtractor {
    fetcher: LocalFetcher,
    opts: FetchOptions,
}

impl PageExtractor {
    pub fn new(fetcher: LocalFetcher, opts: FetchOptions) -> Self {
        Self { fetcher, opts }
    }
}

#[async_trait::async_trait]
impl TextExtractor for PageExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedText> {
        let resp = self.fetcher.fetch(url, &self.opts).await?;
        if !(200..300).contains(&resp.status) {
            return Err(Error::Fetch(format!("HTTP {} for {url}", resp.status)));
        }
        let t0 = std::time::Instant::now();
        let text = text_from_bytes(&resp.bytes, resp.content_type.as_deref())?;
        let mut timings_ms = resp.timings_ms;
        timings_ms.insert("extract".to_string(), t0.elapsed().as_millis());
        Ok(ExtractedText {
            url: resp.url,
            final_url: resp.final_url,
            text,
            truncated: resp.truncated,
            timings_ms,
        })
    }
}
