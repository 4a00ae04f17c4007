// tests/http_adapters.rs
//
// HTTP adapters against wiremock servers: Google News RSS search, article pages,
// chat-completions provider behind the caching client.

mod common;

use std::path::PathBuf;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{ARTICLE_HTML, COMPANY_FEED};
use competitor_research::ai_adapter::{
    CachingClient, ChatCompletionsProvider, CompletionRequest, LlmClient,
};
use competitor_research::config::ai::ModelProfile;
use competitor_research::config::research::{ArticleSettings, NewsSettings};
use competitor_research::ingest::article::{
    fetch_all, ArticleFailure, ArticleOutcome, HttpArticleFetcher,
};
use competitor_research::ingest::providers::google_news::GoogleNewsProvider;
use competitor_research::ingest::types::{NewsItem, NewsProvider, NewsQuery};

fn news_settings(base_url: String, max_results: usize) -> NewsSettings {
    NewsSettings {
        base_url,
        max_results,
        ..NewsSettings::default()
    }
}

#[tokio::test]
async fn google_news_search_sends_window_and_parses_feed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss/search"))
        .and(query_param("q", "Acme when:7d"))
        .and(query_param("hl", "en-US"))
        .and(query_param("ceid", "US:en"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(COMPANY_FEED)
                .insert_header("content-type", "application/rss+xml; charset=utf-8"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = GoogleNewsProvider::from_settings(&news_settings(server.uri(), 2)).unwrap();
    let items = provider
        .search(&NewsQuery::Company("Acme".into()))
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].title, "Acme launches Widget X - TechDaily");
    assert_eq!(items[1].url, "https://news.test/c2");
}

#[tokio::test]
async fn google_news_error_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss/search"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let provider = GoogleNewsProvider::from_settings(&news_settings(server.uri(), 25)).unwrap();
    let err = provider
        .search(&NewsQuery::Site("acme.com".into()))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("non-2xx"));
}

#[tokio::test]
async fn articles_are_fetched_best_effort_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/news/widget"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ARTICLE_HTML)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/video"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body><video></video></body></html>"))
        .mount(&server)
        .await;

    let fetcher = HttpArticleFetcher::new(&ArticleSettings::default()).unwrap();
    let items = vec![
        NewsItem::new("Gone", format!("{}/news/gone", server.uri()), "d0"),
        NewsItem::new("Widget X - TechDaily", format!("{}/news/widget", server.uri()), "d1"),
        NewsItem::new("Video", format!("{}/news/video", server.uri()), "d2"),
    ];
    let out = fetch_all(&fetcher, &items).await;

    assert_eq!(out.len(), 3);
    assert!(matches!(
        &out[0],
        ArticleOutcome::Absent { reason: ArticleFailure::Status(404), .. }
    ));
    let art = out[1].article().expect("widget fetched");
    assert_eq!(art.title, "Acme launches Widget X");
    assert_eq!(
        art.text,
        "Acme on Monday unveiled Widget X, its first product aimed at small warehouses.\n\
         The company said shipments start in \"early Q4\"."
    );
    assert!(matches!(
        &out[2],
        ArticleOutcome::Absent { reason: ArticleFailure::Empty, .. }
    ));
}

#[tokio::test]
async fn unreachable_article_is_a_transport_failure() {
    let fetcher = HttpArticleFetcher::new(&ArticleSettings {
        timeout_secs: 2,
        ..ArticleSettings::default()
    })
    .unwrap();
    let out = fetch_all(&fetcher, &[NewsItem::new("x", "http://127.0.0.1:1/nope", "d")]).await;
    assert!(matches!(
        &out[0],
        ArticleOutcome::Absent { reason: ArticleFailure::Transport(_), .. }
    ));
}

fn profile(base_url: String) -> ModelProfile {
    ModelProfile {
        provider: "openai".into(),
        model: "gpt-test".into(),
        api_key: "sk-test".into(),
        base_url: Some(base_url),
        temperature: Some(0.2),
        max_tokens: None,
    }
}

fn cache_dir() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("ai");
    (dir, p)
}

#[tokio::test]
async fn chat_completions_call_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Acme builds rockets.\n" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_guard, dir) = cache_dir();
    let provider = ChatCompletionsProvider::from_profile(&profile(server.uri())).unwrap();
    let client = CachingClient::new(provider, dir, 10);
    let req = CompletionRequest::new("Tell me about the company Acme - acme.com")
        .with_system("You are a research assistant.");

    assert_eq!(client.complete(&req).await.unwrap(), "Acme builds rockets.");
    assert_eq!(client.complete(&req).await.unwrap(), "Acme builds rockets.");

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = received[0].body_json().unwrap();
    assert_eq!(body["model"], "gpt-test");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "Tell me about the company Acme - acme.com");
}

#[tokio::test]
async fn chat_completions_http_error_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (_guard, dir) = cache_dir();
    let provider = ChatCompletionsProvider::from_profile(&profile(server.uri())).unwrap();
    let client = CachingClient::new(provider, dir, 10);
    assert!(client.complete(&CompletionRequest::new("hi")).await.is_err());
}

#[tokio::test]
async fn exhausted_daily_limit_never_reaches_the_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_guard, dir) = cache_dir();
    let provider = ChatCompletionsProvider::from_profile(&profile(server.uri())).unwrap();
    let client = CachingClient::new(provider, dir, 0);
    let err = client
        .complete(&CompletionRequest::new("hi"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("daily AI limit"));
}
