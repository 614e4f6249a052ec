//! End-to-end companion scenarios against isolated service instances

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use threadwise::core::{
    CompletionProvider, ContentId, ContentItem, EmbeddingProvider, GenerationOptions,
};
use threadwise::error::Result;
use threadwise::retrieval::GroundingContext;
use threadwise::{AppServices, CompanionRequest, Config};

/// Maps every text mentioning the borrow checker to the same vector
struct TopicEmbedder;

#[async_trait]
impl EmbeddingProvider for TopicEmbedder {
    fn name(&self) -> &str {
        "topic"
    }

    fn dimensions(&self) -> usize {
        4
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.to_lowercase();
        if text.contains("borrow") {
            Ok(vec![1.0, 0.0, 0.0, 0.0])
        } else if text.contains("async") {
            Ok(vec![0.0, 1.0, 0.0, 0.0])
        } else {
            Ok(vec![0.0, 0.0, 1.0, 0.0])
        }
    }
}

/// Echoes how many sources it was given and counts calls
#[derive(Default)]
struct CountingCompletion {
    calls: AtomicUsize,
}

#[async_trait]
impl CompletionProvider for CountingCompletion {
    fn name(&self) -> &str {
        "counting"
    }

    async fn complete(
        &self,
        prompt: &str,
        grounding: &GroundingContext,
        _options: &GenerationOptions,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("answer to '{}' from {} sources", prompt, grounding.source_count()))
    }
}

fn services(completion: Arc<CountingCompletion>) -> AppServices {
    let mut config = Config::default();
    config.index.dimensions = 4;
    AppServices::with_providers(&config, Arc::new(TopicEmbedder), completion)
}

#[tokio::test]
async fn empty_index_still_answers_without_citations() {
    let services = AppServices::from_config(&Config::default()).unwrap();

    let response = services
        .orchestrator
        .answer(CompanionRequest::new("rust ownership", "alice"))
        .await
        .unwrap();

    assert!(response.citations.is_empty());
    assert!(response.sources.is_empty());
    assert!(!response.text.is_empty());
    assert!(!response.cached);
}

#[tokio::test]
async fn similar_query_cites_matching_post() {
    let completion = Arc::new(CountingCompletion::default());
    let services = services(completion.clone());
    services
        .sync
        .on_upsert(&ContentItem::post(1, "Borrow checker explained", "Borrow checker explained"))
        .await
        .unwrap();
    services
        .sync
        .on_upsert(&ContentItem::post(2, "Async runtimes", "Picking an async executor"))
        .await
        .unwrap();

    let response = services
        .orchestrator
        .answer(CompanionRequest::new("explain the borrow checker", "alice"))
        .await
        .unwrap();

    let first = &response.citations[0];
    assert_eq!(first.content_id, ContentId(1));
    assert!(first.relevance_score > 0.5);
    assert_eq!(response.sources[0].url, first.source_url);
    assert_eq!(completion.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn revision_bump_bypasses_cached_answer() {
    let completion = Arc::new(CountingCompletion::default());
    let services = services(completion.clone());
    let post = ContentItem::post(1, "Borrow checker explained", "Borrow checker explained");
    services.sync.on_upsert(&post).await.unwrap();

    let request = CompanionRequest::new("explain the borrow checker", "alice");
    let first = services.orchestrator.answer(request.clone()).await.unwrap();
    let repeat = services.orchestrator.answer(request.clone()).await.unwrap();
    assert!(!first.cached);
    assert!(repeat.cached);
    assert_eq!(completion.calls.load(Ordering::SeqCst), 1);

    services
        .sync
        .on_upsert(&post.clone().at_revision(2))
        .await
        .unwrap();

    let after_edit = services.orchestrator.answer(request).await.unwrap();
    assert!(!after_edit.cached);
    assert_eq!(completion.calls.load(Ordering::SeqCst), 2);
    assert_eq!(after_edit.citations[0].revision, 2);
}

#[tokio::test]
async fn deleted_citation_bypasses_cached_answer() {
    let completion = Arc::new(CountingCompletion::default());
    let services = services(completion.clone());
    services
        .sync
        .on_upsert(&ContentItem::post(1, "Borrow checker explained", "Borrow checker explained"))
        .await
        .unwrap();

    let request = CompanionRequest::new("explain the borrow checker", "alice");
    services.orchestrator.answer(request.clone()).await.unwrap();
    assert!(services.sync.on_delete(ContentId(1)));

    let response = services.orchestrator.answer(request).await.unwrap();
    assert!(!response.cached);
    assert!(response.citations.is_empty());
    assert_eq!(completion.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn every_reply_reports_quota() {
    let mut config = Config::default();
    config.index.dimensions = 4;
    config.rate_limit.limits.companion_query = 1;
    let services = AppServices::with_providers(
        &config,
        Arc::new(TopicEmbedder),
        Arc::new(CountingCompletion::default()),
    );

    let ok = services
        .orchestrator
        .respond(CompanionRequest::new("borrow checker", "bob"))
        .await;
    assert!(ok.is_ok());
    assert_eq!(ok.quota.remaining, 0);

    let throttled = services
        .orchestrator
        .respond(CompanionRequest::new("borrow checker", "bob"))
        .await;
    assert!(!throttled.is_ok());
    assert_eq!(throttled.quota.remaining, 0);
    assert_eq!(throttled.quota.reset_at, ok.quota.reset_at);

    let json = serde_json::to_value(&throttled).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["error"]["code"], "throttled");
}
