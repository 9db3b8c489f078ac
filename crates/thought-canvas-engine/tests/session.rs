//! Async session tests with in-memory topic services.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thought_canvas_engine::{
    EngineConfig, EngineError, ExplorationSession, ExpansionOutcome, Insight, OfflineTopicService,
    ServiceError, StaticCredential, TopicService, TopicSuggestion,
};
use tokio::sync::Notify;

// ============================================================================
// Test services
// ============================================================================

/// Answers insights immediately but holds every children request until the
/// gate is opened.
#[derive(Default)]
struct GatedService {
    gate: Notify,
    calls: AtomicUsize,
}

#[async_trait]
impl TopicService for GatedService {
    async fn request_children(
        &self,
        parent_label: &str,
        desired_count: usize,
        _ancestor_path: &[String],
        _excluded: &[String],
    ) -> Result<Vec<TopicSuggestion>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok((0..desired_count.min(3))
            .map(|i| TopicSuggestion::new(format!("{parent_label} {i}"), ""))
            .collect())
    }

    async fn request_insight(&self, label: &str) -> Result<Insight, ServiceError> {
        Ok(Insight {
            description: format!("gated {label}"),
            sources: Vec::new(),
        })
    }
}

/// Offline answers, but only with a credential.
struct KeyedService;

#[async_trait]
impl TopicService for KeyedService {
    async fn request_children(
        &self,
        parent_label: &str,
        desired_count: usize,
        ancestor_path: &[String],
        excluded: &[String],
    ) -> Result<Vec<TopicSuggestion>, ServiceError> {
        OfflineTopicService
            .request_children(parent_label, desired_count, ancestor_path, excluded)
            .await
    }

    async fn request_insight(&self, label: &str) -> Result<Insight, ServiceError> {
        OfflineTopicService.request_insight(label).await
    }

    fn requires_credential(&self) -> bool {
        true
    }
}

fn offline_session() -> ExplorationSession {
    ExplorationSession::new(
        EngineConfig::default(),
        Arc::new(OfflineTopicService),
        Arc::new(StaticCredential::default()),
    )
    .unwrap()
}

async fn wait_for_calls(service: &GatedService, n: usize) {
    while service.calls.load(Ordering::SeqCst) < n {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn start_enriches_root_and_runs_animation() {
    let session = offline_session();
    assert!(!session.is_animating());

    let root = session.start("Rust").await.unwrap();
    let snapshot = session.snapshot().await;
    let node = snapshot.get(root).unwrap();
    assert!(!node.is_loading);
    assert!(node.description.starts_with("An overview of Rust"));
    assert!(session.is_animating());

    let outcome = session.expand(root).await.unwrap().unwrap();
    let ExpansionOutcome::Attached(kids) = outcome else {
        panic!("expected children");
    };
    assert_eq!(kids.len(), 4);
    assert_eq!(session.current_frame().node_count, 5);

    // The earlier snapshot is untouched.
    assert_eq!(snapshot.len(), 1);
    session.stop().await;
}

#[tokio::test]
async fn frames_are_published_to_subscribers() {
    let session = offline_session();
    let mut frames = session.subscribe();
    assert_eq!(frames.borrow_and_update().node_count, 0);

    let root = session.start("Graphs").await.unwrap();
    assert!(frames.has_changed().unwrap());
    let frame = frames.borrow_and_update().clone();
    assert_eq!(frame.node_count, 1);
    assert!(frame.render.node(root).is_some());

    session.update(|engine| engine.set_edit_mode(true)).await.unwrap();
    assert!(frames.borrow_and_update().edit_mode);
    session.stop().await;
}

#[tokio::test]
async fn concurrent_expansion_of_same_node_is_refused() {
    let service = Arc::new(GatedService::default());
    let session = ExplorationSession::new(
        EngineConfig::default(),
        service.clone(),
        Arc::new(StaticCredential::default()),
    )
    .unwrap();
    let root = session.start("X").await.unwrap();

    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.expand(root).await })
    };
    wait_for_calls(&service, 1).await;
    assert!(session.snapshot().await.get(root).unwrap().is_loading);

    assert!(session.expand(root).await.unwrap().is_none());
    assert!(session.request_insight(root).await.unwrap().is_none());

    service.gate.notify_one();
    let outcome = pending.await.unwrap().unwrap().unwrap();
    assert!(matches!(outcome, ExpansionOutcome::Attached(ref ids) if ids.len() == 3));
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.snapshot().await.len(), 4);
    session.stop().await;
}

#[tokio::test]
async fn prune_during_request_discards_response() {
    let service = Arc::new(GatedService::default());
    let session = ExplorationSession::new(
        EngineConfig::default(),
        service.clone(),
        Arc::new(StaticCredential::default()),
    )
    .unwrap();
    let root = session.start("X").await.unwrap();

    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.expand(root).await })
    };
    wait_for_calls(&service, 1).await;
    session
        .update(|engine| engine.prune(root))
        .await
        .unwrap()
        .unwrap();

    service.gate.notify_one();
    let outcome = pending.await.unwrap().unwrap();
    assert_eq!(outcome, Some(ExpansionOutcome::Discarded));
    assert!(session.snapshot().await.is_empty());
    session.stop().await;
}

#[tokio::test]
async fn missing_credential_is_an_expansion_failure() {
    let credentials = Arc::new(StaticCredential::default());
    let session = ExplorationSession::new(
        EngineConfig::default(),
        Arc::new(KeyedService),
        credentials.clone(),
    )
    .unwrap();

    let root = session.start("X").await.unwrap();
    let snapshot = session.snapshot().await;
    let node = snapshot.get(root).unwrap();
    assert!(!node.is_loading);
    assert_eq!(
        node.description,
        EngineConfig::default().expansion.fallback_description
    );
    assert!(node.last_error.as_deref().unwrap().contains("credential"));

    let outcome = session.expand(root).await.unwrap().unwrap();
    assert!(matches!(outcome, ExpansionOutcome::Failed(_)));

    credentials.set("sk-test");
    let outcome = session.expand(root).await.unwrap().unwrap();
    assert!(matches!(outcome, ExpansionOutcome::Attached(ref ids) if ids.len() == 4));
    session.stop().await;
}

#[tokio::test]
async fn stop_ends_the_session() {
    let session = offline_session();
    let root = session.start("X").await.unwrap();
    assert!(session.is_animating());

    session.stop().await;
    assert!(!session.is_animating());
    assert!(matches!(session.expand(root).await, Err(EngineError::Stopped)));
    assert!(matches!(session.start("Y").await, Err(EngineError::Stopped)));
}

#[tokio::test]
async fn dropping_the_session_closes_the_frame_stream() {
    let session = offline_session();
    session.start("X").await.unwrap();
    let mut frames = session.subscribe();
    drop(session);

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        while frames.changed().await.is_ok() {}
    })
    .await;
    assert!(closed.is_ok());
}

#[tokio::test]
async fn empty_topic_is_rejected() {
    let session = offline_session();
    assert!(matches!(session.start("  ").await, Err(EngineError::EmptyTopic)));
    assert!(!session.is_animating());
}
