use lazy_static::lazy_static;
use scraper::{Html, Selector};
use url::Url;

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").expect("valid selector");
    static ref BODY: Selector = Selector::parse("body").expect("valid selector");
    static ref LINK: Selector = Selector::parse("a[href]").expect("valid selector");
}

const SKIPPED_EXTENSIONS: &[&str] = &[
    ".pdf", ".zip", ".jpg", ".jpeg", ".png", ".gif", ".doc", ".docx", ".xls", ".xlsx", ".mp3", ".mp4",
];

/// Text and outgoing links of one fetched HTML page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub title: String,
    pub content: String,
    pub links: Vec<Url>,
}

impl Page {
    /// Relative links are resolved against `base`.
    pub fn parse(html: &str, base: &Url) -> Self {
        let doc = Html::parse_document(html);
        let title = doc.select(&TITLE).next().map(|n| collapse(&n.text().collect::<String>())).unwrap_or_default();
        let content = doc.select(&BODY).next().map(|n| collapse(&n.text().collect::<String>())).unwrap_or_default();
        let links = doc
            .select(&LINK)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| base.join(href.trim()).ok())
            .collect();
        Page { title, content, links }
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether a discovered link stays inside the crawl: same host as the start
/// page, http(s), no fragment and no download extension.
pub fn is_crawlable(link: &Url, start: &Url) -> bool {
    if !matches!(link.scheme(), "http" | "https") || link.fragment().is_some() {
        return false;
    }
    if link.host_str() != start.host_str() {
        return false;
    }
    let path = link.path().to_lowercase();
    !SKIPPED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}
