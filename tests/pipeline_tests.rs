//! End-to-end request path tests over both store backends.

mod common;

use std::sync::Arc;

use common::fixtures::{CacheEntryBuilder, EMBEDDING_DIM, RequestBuilder, body_of, seed_store};
use qbank::{
    CacheReader, CacheStore, FileStore, GenerationOutcome, JobLedger, JobOutcome, MemoryStore,
    MockGenerator, QueueSettings, QuestionBank, Reconciliation, ReconcileQueue, StubEmbedder,
    UnitLevel,
};
use tempfile::TempDir;

async fn bank<S>(store: Arc<S>, generator: &MockGenerator, rate: f64, seed: u64) -> QuestionBank<S>
where
    S: CacheStore + JobLedger + 'static,
{
    let (queue, _handle) = ReconcileQueue::start(
        Arc::clone(&store),
        Arc::new(StubEmbedder::new(EMBEDDING_DIM)),
        QueueSettings::default(),
    )
    .await
    .expect("start queue");
    QuestionBank::new(store, Arc::new(generator.clone()), queue, CacheReader::new(rate, 0.9))
        .with_rng_seed(Some(seed))
}

async fn settle(outcome: GenerationOutcome) -> Option<JobOutcome> {
    match outcome.reconciliation {
        Reconciliation::Queued(ticket) => ticket.wait().await,
        _ => None,
    }
}

#[tokio::test]
async fn test_generated_questions_are_reused_after_restart() {
    let dir = TempDir::new().expect("temp dir");
    let generator = MockGenerator::new();
    let request = RequestBuilder::new()
        .group("Short answer", 2, &["Recall", "Understand", "Apply"])
        .build();

    {
        let store = Arc::new(FileStore::open(dir.path()).await.expect("open"));
        let first = bank(store, &generator, 1.0, 1)
            .await
            .generate(&request)
            .await
            .expect("generate");
        assert_eq!(first.stats.cache_miss_count, 3);
        assert!(settle(first).await.expect("queued").is_success());
    }

    let store = Arc::new(FileStore::open(dir.path()).await.expect("reopen"));
    let second = bank(Arc::clone(&store), &generator, 1.0, 2)
        .await
        .generate(&request)
        .await
        .expect("generate");

    assert_eq!(second.stats.cache_hit_count, 3);
    assert_eq!(generator.call_count(), 1);
    let objectives: Vec<&str> = second.answers[0]
        .questions
        .iter()
        .map(|q| q.objective.as_str())
        .collect();
    assert_eq!(objectives, vec!["Recall", "Understand", "Apply"]);
    assert!(matches!(second.reconciliation, Reconciliation::NotNeeded));
    assert_eq!(store.list_jobs().await.expect("jobs").len(), 2);
}

#[tokio::test]
async fn test_near_duplicate_cached_questions_fill_only_one_slot() {
    let store = Arc::new(MemoryStore::new());
    seed_store(
        store.as_ref(),
        vec![
            CacheEntryBuilder::new()
                .question("Recall", "MCQ", 1, "What is a cell?")
                .question("Apply", "MCQ", 1, "what is a CELL")
                .build(),
        ],
    )
    .await;
    let generator = MockGenerator::new();
    let request = RequestBuilder::new().group("MCQ", 1, &["Recall", "Apply"]).build();

    let outcome = bank(Arc::clone(&store), &generator, 1.0, 9)
        .await
        .generate(&request)
        .await
        .expect("generate");

    assert_eq!(outcome.stats.cache_hit_count, 1);
    assert_eq!(outcome.stats.cache_miss_count, 1);
    assert_eq!(body_of(&outcome.answers[0].questions[0].content), "What is a cell?");
    assert!(body_of(&outcome.answers[0].questions[1].content).starts_with("Generated question"));
}

#[tokio::test]
async fn test_mixed_template_keeps_group_order_and_counts() {
    let store = Arc::new(MemoryStore::new());
    seed_store(
        store.as_ref(),
        vec![
            CacheEntryBuilder::new()
                .question("Recall", "MCQ", 1, "Name the powerhouse of the cell")
                .question("Recall", "Essay", 5, "Describe mitosis in detail")
                .build(),
        ],
    )
    .await;
    let generator = MockGenerator::new();
    let request = RequestBuilder::new()
        .group("MCQ", 1, &["Recall", "Recall"])
        .group("Match the following", 4, &["Recall"])
        .group("Essay", 5, &["Recall"])
        .build();

    let outcome = bank(Arc::clone(&store), &generator, 1.0, 4)
        .await
        .generate(&request)
        .await
        .expect("generate");

    let counts: Vec<usize> = outcome.answers.iter().map(|g| g.number_of_questions).collect();
    assert_eq!(counts, vec![2, 1, 1]);
    assert_eq!(outcome.stats.total_decisions, 4);
    assert_eq!(outcome.stats.cache_hit_count, 2);
    assert_eq!(
        body_of(&outcome.answers[2].questions[0].content),
        "Describe mitosis in detail"
    );

    let job = settle(outcome).await.expect("queued");
    assert!(job.is_success());
    let entries = store
        .find_matching(&["unit-cells".to_string()], UnitLevel::Chapter, &[])
        .await
        .expect("find");
    assert_eq!(entries[0].questions_for("Recall").len(), 3);
}

#[tokio::test]
async fn test_zero_usage_rate_always_generates() {
    let store = Arc::new(MemoryStore::new());
    seed_store(
        store.as_ref(),
        vec![CacheEntryBuilder::new().question("Recall", "MCQ", 1, "Cached").build()],
    )
    .await;
    let generator = MockGenerator::new();
    let request = RequestBuilder::new().group("MCQ", 1, &["Recall"]).build();

    let outcome = bank(Arc::clone(&store), &generator, 0.0, 5)
        .await
        .generate(&request)
        .await
        .expect("generate");

    assert_eq!(outcome.stats.cache_hit_count, 0);
    assert_eq!(generator.call_count(), 1);
}

#[tokio::test]
async fn test_unit_level_separates_cache_entries() {
    let store = Arc::new(MemoryStore::new());
    seed_store(
        store.as_ref(),
        vec![
            CacheEntryBuilder::new()
                .unit("unit-cells", "Cells", UnitLevel::Subtopic)
                .question("Recall", "MCQ", 1, "Subtopic only")
                .build(),
        ],
    )
    .await;
    let generator = MockGenerator::new();
    let request = RequestBuilder::new()
        .unit_level(UnitLevel::Chapter)
        .group("MCQ", 1, &["Recall"])
        .build();

    let outcome = bank(Arc::clone(&store), &generator, 1.0, 6)
        .await
        .generate(&request)
        .await
        .expect("generate");

    assert_eq!(outcome.stats.cache_miss_count, 1);
}
