//! Breadth-first site crawler feeding the document store and index.

use anyhow::{bail, Result};
use parking_lot::RwLock;
use reqwest::{header, Client};
use search_core::{DocumentRequest, DocumentStore, IndexingService, UpsertOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use url::Url;

pub mod history;
pub mod page;
pub mod robots;

pub use history::{CrawlHistory, CrawlHistoryLog};
use page::{is_crawlable, Page};
use robots::Robots;

pub const USER_AGENT: &str = "search-engine-rs-bot/0.1";
const TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
/// Pages with this many characters of text or fewer are fetched but not stored.
pub const MIN_CONTENT_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRequest {
    pub start_url: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_true")]
    pub respect_robots_txt: bool,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_pages() -> usize {
    10
}

fn default_max_depth() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_delay_ms() -> u64 {
    1000
}

impl CrawlRequest {
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            max_pages: default_max_pages(),
            max_depth: default_max_depth(),
            respect_robots_txt: true,
            delay_ms: default_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlStatus {
    Started,
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub status: CrawlStatus,
    pub pages_processed: usize,
    pub documents_indexed: usize,
    pub error_count: usize,
    pub errors: Vec<String>,
    pub crawl_time_ms: u64,
    pub history_id: Option<u64>,
}

#[derive(Default)]
struct Tally {
    pages_processed: usize,
    documents_indexed: usize,
    errors: Vec<String>,
}

impl Tally {
    fn fail(&mut self, message: String) {
        tracing::error!("{message}");
        self.errors.push(message);
    }
}

/// Crawls one site per request, upserting every page with enough text into
/// the store and, when an indexing service is attached, into the index.
#[derive(Clone)]
pub struct Crawler {
    client: Client,
    store: Arc<DocumentStore>,
    indexing: Option<IndexingService>,
    history: CrawlHistoryLog,
    robots: Arc<RwLock<HashMap<String, Robots>>>,
}

impl Crawler {
    pub fn new(store: Arc<DocumentStore>, indexing: Option<IndexingService>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(TIMEOUT)
            .build()?;
        let history = CrawlHistoryLog::open(&store)?;
        Ok(Self { client, store, indexing, history, robots: Arc::new(RwLock::new(HashMap::new())) })
    }

    pub fn history(&self) -> &CrawlHistoryLog {
        &self.history
    }

    /// Fetch failures are collected into the result. Only history and
    /// store I/O errors abort the crawl.
    pub async fn crawl(&self, request: &CrawlRequest) -> Result<CrawlResult> {
        let started = Instant::now();
        let mut entry = self.history.start(&request.start_url)?;
        tracing::info!(
            start_url = %request.start_url,
            max_pages = request.max_pages,
            max_depth = request.max_depth,
            delay_ms = request.delay_ms,
            "crawl started"
        );

        let mut tally = Tally::default();
        match Url::parse(request.start_url.trim()) {
            Ok(start) => self.walk(&start, request, &mut tally).await?,
            Err(err) => tally.fail(format!("Invalid start URL {}: {err}", request.start_url)),
        }

        let status = if tally.errors.is_empty() {
            CrawlStatus::Success
        } else if tally.documents_indexed > 0 {
            CrawlStatus::Partial
        } else {
            CrawlStatus::Failed
        };
        let result = CrawlResult {
            status,
            pages_processed: tally.pages_processed,
            documents_indexed: tally.documents_indexed,
            error_count: tally.errors.len(),
            errors: tally.errors,
            crawl_time_ms: started.elapsed().as_millis() as u64,
            history_id: Some(entry.id),
        };
        self.history.finish(&mut entry, &result)?;
        tracing::info!(
            ?status,
            pages = result.pages_processed,
            indexed = result.documents_indexed,
            errors = result.error_count,
            took_ms = result.crawl_time_ms,
            "crawl finished"
        );
        Ok(result)
    }

    async fn walk(&self, start: &Url, request: &CrawlRequest, tally: &mut Tally) -> Result<()> {
        let mut frontier: VecDeque<(Url, usize)> = VecDeque::from([(start.clone(), 0)]);
        let mut visited: HashSet<String> = HashSet::new();

        while let Some((url, depth)) = frontier.pop_front() {
            if tally.pages_processed >= request.max_pages {
                break;
            }
            if !visited.insert(norm(&url)) {
                continue;
            }
            let mut delay_ms = request.delay_ms;
            if request.respect_robots_txt {
                let robots = self.robots_for(&url).await;
                if !robots.allows(url.path()) {
                    tracing::debug!(%url, "disallowed by robots.txt");
                    continue;
                }
                delay_ms = delay_ms.max(robots.crawl_delay_ms.unwrap_or(0));
            }
            if tally.pages_processed > 0 && delay_ms > 0 {
                sleep(Duration::from_millis(delay_ms)).await;
            }

            tracing::info!(depth, %url, "crawling");
            let page = match self.fetch(&url).await {
                Ok(page) => page,
                Err(err) => {
                    tally.fail(format!("Failed to fetch {url}: {err:#}"));
                    continue;
                }
            };
            tally.pages_processed += 1;

            if page.content.chars().count() > MIN_CONTENT_CHARS {
                self.save(&url, &page)?;
                tally.documents_indexed += 1;
            } else {
                tracing::warn!(%url, "skipped, too little text");
            }

            if depth < request.max_depth {
                let before = frontier.len();
                frontier.extend(page.links.into_iter().filter(|l| is_crawlable(l, start)).map(|l| (l, depth + 1)));
                tracing::debug!(depth, queued = frontier.len() - before, "links queued");
            }
        }
        Ok(())
    }

    async fn fetch(&self, url: &Url) -> Result<Page> {
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            bail!("HTTP {status}");
        }
        if let Some(ct) = resp.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
            if !ct.starts_with("text/html") {
                bail!("unsupported content type {ct}");
            }
        }
        let bytes = resp.bytes().await?;
        if bytes.len() > MAX_BODY_BYTES {
            bail!("body too large ({} bytes)", bytes.len());
        }
        Ok(Page::parse(&String::from_utf8_lossy(&bytes), url))
    }

    fn save(&self, url: &Url, page: &Page) -> Result<()> {
        let request = DocumentRequest { title: page.title.clone(), content: page.content.clone(), url: url.to_string() };
        match self.store.upsert_by_url(request)? {
            UpsertOutcome::Created(doc) => {
                if let Some(indexing) = &self.indexing {
                    indexing.add(Some(doc.id), &doc.content);
                }
                tracing::info!(doc_id = doc.id, title = %doc.title, %url, "page indexed");
            }
            UpsertOutcome::Updated(doc) => {
                if let Some(indexing) = &self.indexing {
                    indexing.reindex(doc.id, &doc.content);
                }
                tracing::info!(doc_id = doc.id, %url, "document updated by crawler");
            }
        }
        Ok(())
    }

    /// Cached per origin; an unreachable robots.txt allows everything.
    async fn robots_for(&self, url: &Url) -> Robots {
        let origin = url.origin().ascii_serialization();
        let cached = self.robots.read().get(&origin).cloned();
        if let Some(rules) = cached {
            return rules;
        }
        let txt = match url.join("/robots.txt") {
            Ok(robots_url) => match self.client.get(robots_url).send().await {
                Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
                _ => String::new(),
            },
            Err(_) => String::new(),
        };
        let rules = Robots::parse(&txt);
        self.robots.write().insert(origin, rules.clone());
        rules
    }
}

fn norm(u: &Url) -> String {
    let mut s = u.clone();
    s.set_fragment(None);
    s.to_string()
}
