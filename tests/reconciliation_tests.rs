//! Reconciliation queue tests against the file store.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::fixtures::{EMBEDDING_DIM, RequestBuilder};
use qbank::{
    CacheReader, CacheStore, Embedder, EmbeddingError, FileStore, JobLedger, JobOutcome,
    MockGenerator, QueueSettings, QuestionBank, Reconciliation, ReconcileQueue, RetryOutcome,
    StubEmbedder, UnitLevel,
};
use tempfile::TempDir;

struct UnavailableEmbedder;

#[async_trait]
impl Embedder for UnavailableEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::InferenceFailed {
            reason: "model not loaded".to_string(),
        })
    }

    fn embedding_dim(&self) -> usize {
        EMBEDDING_DIM
    }
}

async fn bank_with(store: Arc<FileStore>, embedder: Arc<dyn Embedder>) -> QuestionBank<FileStore> {
    let (queue, _handle) = ReconcileQueue::start(Arc::clone(&store), embedder, QueueSettings::default())
        .await
        .expect("start queue");
    QuestionBank::new(
        store,
        Arc::new(MockGenerator::new()),
        queue,
        CacheReader::new(1.0, 0.9),
    )
}

#[tokio::test]
async fn test_failed_job_survives_restart_and_is_retried() {
    let dir = TempDir::new().expect("temp dir");
    let request = RequestBuilder::new().group("MCQ", 1, &["Recall", "Apply"]).build();

    let job_id = {
        let store = Arc::new(FileStore::open(dir.path()).await.expect("open"));
        let outcome = bank_with(store, Arc::new(UnavailableEmbedder))
            .await
            .generate(&request)
            .await
            .expect("generation succeeds even if reconciliation fails");
        assert_eq!(outcome.answers[0].number_of_questions, 2);

        let job_id = outcome.job_id;
        let Reconciliation::Queued(ticket) = outcome.reconciliation else {
            panic!("expected a queued job");
        };
        assert!(matches!(
            ticket.wait().await,
            Some(JobOutcome::Failed { .. })
        ));
        job_id
    };

    let store = Arc::new(FileStore::open(dir.path()).await.expect("reopen"));
    let failed = store.get_job(job_id).await.expect("get").expect("present");
    assert!(failed.is_retryable());
    assert!(failed.last_error.as_deref().unwrap_or_default().contains("model not loaded"));
    assert!(
        store
            .find_matching(&["unit-cells".to_string()], UnitLevel::Chapter, &[])
            .await
            .expect("find")
            .is_empty()
    );

    let (queue, _handle) = ReconcileQueue::start(
        Arc::clone(&store),
        Arc::new(StubEmbedder::new(EMBEDDING_DIM)),
        QueueSettings::default(),
    )
    .await
    .expect("start queue");
    let report = queue.retry_failed().await.expect("scan");
    assert_eq!(report.scanned, 1);
    for ticket in report.submitted {
        assert!(ticket.wait().await.expect("outcome").is_success());
    }

    let done = store.get_job(job_id).await.expect("get").expect("present");
    assert!(done.is_cache_updated);
    assert!(!done.has_payload());
    assert_eq!(done.attempts, 2);
    let entries = store
        .find_matching(&[], UnitLevel::Chapter, &["cells".to_string()])
        .await
        .expect("find");
    assert_eq!(entries[0].question_count(), 2);

    assert!(matches!(
        queue.retry_job(job_id).await.expect("retry"),
        RetryOutcome::AlreadyReconciled
    ));
}

#[tokio::test]
async fn test_embeddings_are_written_once_per_text() {
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(FileStore::open(dir.path()).await.expect("open"));
    let bank = bank_with(Arc::clone(&store), Arc::new(StubEmbedder::new(EMBEDDING_DIM))).await;
    let request = RequestBuilder::new().group("MCQ", 1, &["Recall"]).build();

    let outcome = bank.generate(&request).await.expect("generate");
    let Reconciliation::Queued(ticket) = outcome.reconciliation else {
        panic!("expected a queued job");
    };
    let JobOutcome::Completed {
        embeddings_written, ..
    } = ticket.wait().await.expect("outcome")
    else {
        panic!("expected completion");
    };
    assert_eq!(embeddings_written, 1);

    let files = std::fs::read_dir(dir.path().join("embeddings"))
        .expect("embeddings dir")
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|x| x == "rkyv"))
        .count();
    assert_eq!(files, 1);
}
