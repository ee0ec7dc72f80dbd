use super::*;
use crate::embedding::{Embedder, StubEmbedder};
use crate::generator::MockGenerator;
use crate::hashing::hash_question_text;
use crate::model::{
    CacheEntry, CachedQuestion, EmbeddingRecord, QuestionContent, QuestionSlot, TemplateGroup,
    UnitLevel,
};
use crate::reconcile::{JobOutcome, QueueSettings};
use crate::storage::MemoryStore;

const DIM: usize = 64;

struct Harness {
    store: MemoryStore,
    generator: MockGenerator,
    bank: QuestionBank<MemoryStore>,
}

async fn harness(rate: f64, seed: Option<u64>, capacity: usize) -> Harness {
    let store = MemoryStore::new();
    let generator = MockGenerator::new();
    let (queue, _handle) = ReconcileQueue::start(
        Arc::new(store.clone()),
        Arc::new(StubEmbedder::new(DIM)),
        QueueSettings {
            capacity,
            ..QueueSettings::default()
        },
    )
    .await
    .expect("start queue");
    let bank = QuestionBank::new(
        Arc::new(store.clone()),
        Arc::new(generator.clone()),
        queue,
        CacheReader::new(rate, 0.9),
    )
    .with_rng_seed(seed);
    Harness {
        store,
        generator,
        bank,
    }
}

fn request() -> GenerationRequest {
    GenerationRequest::new(
        UnitLevel::Chapter,
        vec![TemplateGroup::new(
            "MCQ",
            1,
            vec![
                QuestionSlot::new("cells-id", "Cells", "Recall"),
                QuestionSlot::new("cells-id", "Cells", "Apply"),
            ],
        )],
    )
}

async fn wait_queued(outcome: GenerationOutcome) -> JobOutcome {
    match outcome.reconciliation {
        Reconciliation::Queued(ticket) => ticket.wait().await.expect("worker alive"),
        other => panic!("expected a queued job, got {other:?}"),
    }
}

async fn seed_cache(store: &MemoryStore, bodies: &[&str]) {
    let embedder = StubEmbedder::new(DIM);
    let mut entry = CacheEntry::new("cells-id", "Cells", UnitLevel::Chapter);
    let mut records = Vec::new();
    for body in bodies {
        entry.append("Recall", CachedQuestion::new("MCQ", 1, QuestionContent::text(*body)));
        entry.append("Apply", CachedQuestion::new("MCQ", 1, QuestionContent::text(format!("{body} applied"))));
        for text in [body.to_string(), format!("{body} applied")] {
            let normalized = crate::hashing::normalize_question_text(&text);
            let vector = embedder.embed(&normalized).await.expect("embed");
            records.push(EmbeddingRecord::new(hash_question_text(&text), vector));
        }
    }
    store.insert_embeddings(records).await.expect("embeddings");
    store.upsert_cache_entries(vec![entry]).await.expect("entries");
}

#[tokio::test]
async fn test_empty_cache_generates_everything_and_reconciles() {
    let h = harness(1.0, Some(1), 16).await;

    let outcome = h.bank.generate(&request()).await.expect("generate");

    assert_eq!(outcome.stats.cache_miss_count, 2);
    assert_eq!(outcome.answers.len(), 1);
    assert_eq!(outcome.answers[0].number_of_questions, 2);
    assert_eq!(outcome.answers[0].questions[1].objective, "Apply");
    let job_id = outcome.job_id;
    assert!(wait_queued(outcome).await.is_success());

    let summary = h.store.get_job(job_id).await.expect("get").expect("present");
    assert!(summary.is_cache_updated);
    assert_eq!(summary.total_slots, 2);
    assert_eq!(h.store.entries()[0].question_count(), 2);
}

#[tokio::test]
async fn test_second_request_is_served_from_cache() {
    let h = harness(1.0, Some(1), 16).await;
    let first = h.bank.generate(&request()).await.expect("generate");
    wait_queued(first).await;

    let second = h.bank.generate(&request()).await.expect("generate");

    assert_eq!(second.stats.cache_hit_count, 2);
    assert!(matches!(second.reconciliation, Reconciliation::NotNeeded));
    assert_eq!(h.generator.call_count(), 1);
    let summary = h.store.get_job(second.job_id).await.expect("get").expect("present");
    assert!(summary.is_cache_updated);
    assert!(!summary.has_payload());
}

#[tokio::test]
async fn test_partial_hits_are_merged_in_slot_order() {
    let h = harness(1.0, Some(3), 16).await;
    let mut entry = CacheEntry::new("cells-id", "Cells", UnitLevel::Chapter);
    entry.append("Apply", CachedQuestion::new("MCQ", 1, QuestionContent::text("Cached apply")));
    let text = "Cached apply";
    let vector = StubEmbedder::new(DIM)
        .embed(&crate::hashing::normalize_question_text(text))
        .await
        .expect("embed");
    h.store
        .insert_embeddings(vec![EmbeddingRecord::new(hash_question_text(text), vector)])
        .await
        .expect("embeddings");
    h.store.upsert_cache_entries(vec![entry]).await.expect("entries");

    let outcome = h.bank.generate(&request()).await.expect("generate");

    assert_eq!(outcome.stats.cache_hit_count, 1);
    let questions = &outcome.answers[0].questions;
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0].objective, "Recall");
    assert_eq!(questions[1].content, QuestionContent::text("Cached apply"));
}

#[tokio::test]
async fn test_generator_failure_creates_no_summary() {
    let h = harness(1.0, None, 16).await;
    h.generator.set_should_fail(true);

    let result = h.bank.generate(&request()).await;

    assert!(matches!(result, Err(EngineError::Generator(_))));
    assert!(h.store.list_jobs().await.expect("list").is_empty());
    assert!(h.store.write_log().is_empty());
}

#[tokio::test]
async fn test_generator_shape_mismatch_is_a_generator_failure() {
    let h = harness(1.0, None, 16).await;
    h.generator.set_drop_last_group(true);

    let result = h.bank.generate(&request()).await;

    assert!(matches!(
        result,
        Err(EngineError::Generator(GeneratorError::ShapeMismatch {
            expected: 1,
            actual: 0
        }))
    ));
    assert!(h.store.list_jobs().await.expect("list").is_empty());
}

#[tokio::test]
async fn test_match_the_following_is_generated_but_not_cached() {
    let h = harness(1.0, None, 16).await;
    let request = GenerationRequest::new(
        UnitLevel::Chapter,
        vec![TemplateGroup::new(
            "Match the following",
            4,
            vec![QuestionSlot::new("cells-id", "Cells", "Recall")],
        )],
    );

    let outcome = h.bank.generate(&request).await.expect("generate");

    assert_eq!(outcome.stats.cache_miss_count, 1);
    assert!(matches!(
        outcome.answers[0].questions[0].content,
        QuestionContent::Match { .. }
    ));
    let result = wait_queued(outcome).await;
    assert!(matches!(
        result,
        JobOutcome::Completed {
            questions_appended: 0,
            ..
        }
    ));
    assert_eq!(h.store.entry_count(), 0);
}

#[tokio::test]
async fn test_same_seed_replays_decisions() {
    let bodies = ["Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot"];
    let a = harness(0.5, Some(42), 16).await;
    let b = harness(0.5, Some(42), 16).await;
    seed_cache(&a.store, &bodies).await;
    seed_cache(&b.store, &bodies).await;

    let first = a.bank.generate(&request()).await.expect("generate");
    let second = b.bank.generate(&request()).await.expect("generate");

    assert_eq!(first.stats, second.stats);
    assert_eq!(first.answers, second.answers);
}

#[tokio::test]
async fn test_full_queue_defers_reconciliation() {
    let h = harness(1.0, None, 1).await;

    let first = h.bank.generate(&request()).await.expect("generate");
    let second = h.bank.generate(&request()).await.expect("generate");

    assert!(matches!(first.reconciliation, Reconciliation::Queued(_)));
    assert!(matches!(
        second.reconciliation,
        Reconciliation::Deferred(QueueError::Full { .. })
    ));
    let summary = h.store.get_job(second.job_id).await.expect("get").expect("present");
    assert!(summary.has_payload());
    assert!(!summary.is_cache_updated);
}
