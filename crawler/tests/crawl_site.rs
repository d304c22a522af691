use axum::response::Html;
use axum::routing::get;
use axum::Router;
use crawler::{CrawlRequest, CrawlStatus, Crawler};
use search_core::{Analyzer, DocumentStore, IndexingService, InvertedIndex, NoMetadata, QueryEngine, SearchRequest};
use std::sync::Arc;

fn long_text(topic: &str) -> String {
    format!("{topic} ").repeat(30)
}

fn site() -> Router {
    let home = format!(
        "<html><head><title>Home</title></head><body><p>{}</p>\
         <a href=\"/a\">a</a> <a href=\"/b.pdf\">pdf</a> <a href=\"/c#part\">frag</a>\
         <a href=\"http://other.test/x\">other</a> <a href=\"/short\">short</a>\
         <a href=\"/private\">private</a> <a href=\"/missing\">missing</a></body></html>",
        long_text("welcome")
    );
    let a = format!(
        "<html><head><title>Page A</title></head><body>{}<a href=\"/deep\">deep</a></body></html>",
        long_text("gardening")
    );
    let deep = format!("<html><body>{}</body></html>", long_text("submarine"));
    let private = format!("<html><body>{}</body></html>", long_text("secret"));

    Router::new()
        .route("/", get(move || async move { Html(home) }))
        .route("/a", get(move || async move { Html(a) }))
        .route("/deep", get(move || async move { Html(deep) }))
        .route("/private", get(move || async move { Html(private) }))
        .route("/short", get(|| async { Html("<html><body>tiny</body></html>") }))
        .route("/robots.txt", get(|| async { "User-agent: *\nDisallow: /private\n" }))
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

fn pipeline() -> (Arc<DocumentStore>, IndexingService, QueryEngine) {
    let store = Arc::new(DocumentStore::temporary().unwrap());
    let analyzer = Arc::new(Analyzer::english());
    let index = Arc::new(InvertedIndex::new());
    let indexing = IndexingService::new(index.clone(), analyzer.clone());
    (store, indexing, QueryEngine::new(index, analyzer))
}

fn request(start_url: &str, max_pages: usize, max_depth: usize) -> CrawlRequest {
    CrawlRequest { max_pages, max_depth, delay_ms: 0, ..CrawlRequest::new(start_url) }
}

#[tokio::test]
async fn crawls_same_host_breadth_first() {
    let base = serve(site()).await;
    let (store, indexing, engine) = pipeline();
    let crawler = Crawler::new(store.clone(), Some(indexing.clone())).unwrap();

    let result = crawler.crawl(&request(&base, 10, 1)).await.unwrap();
    // "/", "/a" and "/short" are fetched; "/missing" fails; "/private" is disallowed
    assert_eq!(result.pages_processed, 3);
    assert_eq!(result.documents_indexed, 2);
    assert_eq!(result.error_count, 1);
    assert!(result.errors[0].contains("/missing"));
    assert_eq!(result.status, CrawlStatus::Partial);

    assert_eq!(store.count(), 2);
    assert_eq!(indexing.count(), 2);
    let home = store.get_by_url(&base).unwrap().unwrap();
    assert_eq!(home.title, "Home");
    assert!(home.crawled_at.is_some());

    let found = engine.search(&SearchRequest::new("gardening"), &NoMetadata);
    assert_eq!(found.total_results, 1);
    assert!(engine.search(&SearchRequest::new("submarine"), &NoMetadata).results.is_empty());
    assert!(engine.search(&SearchRequest::new("secret"), &NoMetadata).results.is_empty());

    let history = crawler.history().list().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(Some(history[0].id), result.history_id);
    assert_eq!(history[0].status, CrawlStatus::Partial);
    assert_eq!(history[0].pages_crawled, 3);
    assert!(history[0].finished_at.is_some());
}

#[tokio::test]
async fn recrawl_updates_existing_documents() {
    let base = serve(site()).await;
    let (store, indexing, _) = pipeline();
    let crawler = Crawler::new(store.clone(), Some(indexing.clone())).unwrap();

    let first = crawler.crawl(&request(&base, 1, 0)).await.unwrap();
    assert_eq!(first.status, CrawlStatus::Success);
    let id = store.get_by_url(&base).unwrap().unwrap().id;

    let second = crawler.crawl(&request(&base, 1, 0)).await.unwrap();
    assert_eq!(second.documents_indexed, 1);
    assert_eq!(store.count(), 1);
    assert_eq!(indexing.count(), 1);
    assert_eq!(store.get_by_url(&base).unwrap().unwrap().id, id);
    assert_eq!(crawler.history().list().unwrap().len(), 2);
}

#[tokio::test]
async fn invalid_start_url_fails_without_fetching() {
    let (store, _, _) = pipeline();
    let crawler = Crawler::new(store, None).unwrap();
    let result = crawler.crawl(&CrawlRequest::new("not a url")).await.unwrap();
    assert_eq!(result.status, CrawlStatus::Failed);
    assert_eq!(result.pages_processed, 0);
    assert_eq!(result.error_count, 1);
    let entry = crawler.history().get(result.history_id.unwrap()).unwrap().unwrap();
    assert_eq!(entry.status, CrawlStatus::Failed);
    assert!(entry.error_message.unwrap().contains("not a url"));
}
