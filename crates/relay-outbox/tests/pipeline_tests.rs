//! End-to-end dispatch tests
//!
//! SQLite store + in-memory cache + wiremock webhook, driven through the
//! scheduler and read back through the service.

use std::sync::Arc;
use std::time::Duration;

use relay_common::MessageStatus;
use relay_outbox::{
    DispatchScheduler, DispatchSchedulerConfig, HttpMessageSender, HttpSenderConfig,
    InMemorySentMessageCache, MessageRepository, MessageService, SentMessageCache,
    SqliteMessageRepository,
};
use sqlx::sqlite::SqlitePoolOptions;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Pipeline {
    repo: Arc<SqliteMessageRepository>,
    cache: Arc<InMemorySentMessageCache>,
    service: MessageService,
}

async fn pipeline(webhook_url: String, batch_size: u32) -> Pipeline {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let repo = Arc::new(SqliteMessageRepository::new(pool));
    repo.init_schema().await.unwrap();

    let cache = Arc::new(InMemorySentMessageCache::new(Duration::from_secs(60)));
    let sender = Arc::new(
        HttpMessageSender::new(HttpSenderConfig {
            url: webhook_url,
            auth_key: "test-key".to_string(),
            ..Default::default()
        })
        .unwrap(),
    );

    let config = DispatchSchedulerConfig {
        interval: Duration::from_secs(3600),
        batch_size,
    };
    let cache_dyn: Arc<dyn SentMessageCache> = cache.clone();
    let scheduler = Arc::new(DispatchScheduler::from_config(
        &config,
        repo.clone(),
        sender,
        Some(cache_dyn.clone()),
    ));
    let service = MessageService::new(repo.clone(), Some(cache_dyn), scheduler);

    Pipeline { repo, cache, service }
}

fn accepted(message_id: &str) -> ResponseTemplate {
    ResponseTemplate::new(202)
        .set_body_json(serde_json::json!({"message": "Accepted", "messageId": message_id}))
}

#[tokio::test]
async fn test_tick_sends_oldest_batch_and_records_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(accepted("ext-ok"))
        .expect(2)
        .mount(&server)
        .await;

    let p = pipeline(format!("{}/webhook", server.uri()), 2).await;
    let a = p.service.create_message("+1", "A").await.unwrap();
    let b = p.service.create_message("+2", "B").await.unwrap();
    let c = p.service.create_message("+3", "C").await.unwrap();

    let summary = p.service.scheduler().tick().await;
    assert_eq!(summary.sent, 2);

    let pending = p.repo.fetch_pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, c.id);

    let sent = p.repo.fetch_sent(10).await.unwrap();
    let mut sent_ids: Vec<i64> = sent.iter().map(|m| m.id).collect();
    sent_ids.sort();
    assert_eq!(sent_ids, vec![a.id, b.id]);
    assert!(sent.iter().all(|m| m.status == MessageStatus::Sent && m.external_message_id == "ext-ok"));
    assert_eq!(p.cache.len(), 2);
}

#[tokio::test]
async fn test_rejected_message_stays_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({"content": "bad"})))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(accepted("ext-ok"))
        .mount(&server)
        .await;

    let p = pipeline(format!("{}/webhook", server.uri()), 10).await;
    let bad = p.service.create_message("+1", "bad").await.unwrap();
    let good = p.service.create_message("+2", "good").await.unwrap();

    let summary = p.service.scheduler().tick().await;
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.failed, 1);

    let pending = p.repo.fetch_pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, bad.id);

    let views = p.service.list_sent(10).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].message_id, good.id);
}

#[tokio::test]
async fn test_scheduler_loop_dispatches_until_stopped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(accepted("ext-loop"))
        .mount(&server)
        .await;

    let p = pipeline(format!("{}/webhook", server.uri()), 5).await;
    p.service.create_message("+1", "first").await.unwrap();

    p.service.start_scheduler().await;

    let mut attempts = 0;
    while p.cache.is_empty() && attempts < 200 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        attempts += 1;
    }
    p.service.stop_scheduler().await;

    let views = p.service.list_sent(10).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].content, "first");

    // The loop has exited, so this one is never picked up
    let late = p.service.create_message("+2", "late").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let pending = p.repo.fetch_pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, late.id);
}

#[tokio::test]
async fn test_listing_merges_cache_and_store_after_cache_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(accepted("ext-merge"))
        .mount(&server)
        .await;

    let p = pipeline(format!("{}/webhook", server.uri()), 10).await;
    for content in ["one", "two", "three"] {
        p.service.create_message("+1", content).await.unwrap();
    }
    p.service.scheduler().tick().await;

    // Entries that fell out of the cache are still served from the store
    let cache_only = InMemorySentMessageCache::new(Duration::from_secs(60));
    let sent = p.repo.fetch_sent(10).await.unwrap();
    cache_only
        .put(&relay_common::SentMessageEntry::from_sent(
            &sent[0],
            &sent[0].external_message_id,
            sent[0].sent_at.unwrap(),
        ))
        .await
        .unwrap();
    let scheduler = Arc::new(DispatchScheduler::from_config(
        &DispatchSchedulerConfig::default(),
        p.repo.clone(),
        Arc::new(HttpMessageSender::new(HttpSenderConfig::default()).unwrap()),
        None,
    ));
    let cache_only: Arc<dyn SentMessageCache> = Arc::new(cache_only);
    let partial = MessageService::new(p.repo.clone(), Some(cache_only), scheduler);

    let views = partial.list_sent(10).await.unwrap();
    assert_eq!(views.len(), 3);
    let mut ids: Vec<i64> = views.iter().map(|v| v.message_id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}
