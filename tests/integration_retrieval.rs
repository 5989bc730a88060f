#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end retrieval over the offline hashed encoder: catalog file to
// persisted index to a loaded engine.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use faq_retriever::FaqError;
use faq_retriever::catalog::{Catalog, Entry};
use faq_retriever::embeddings::{Encoder, HashedEncoder};
use faq_retriever::engine::RetrievalEngine;
use faq_retriever::index::{IndexBuilder, store};
use faq_retriever::policy::{ConfidencePolicy, Decision, TierPolicy};
use tempfile::TempDir;

const DIMENSION: usize = 512;

fn entry(id: &str, question: &str) -> Entry {
    Entry {
        id: id.to_string(),
        category: "Студенческий офис".to_string(),
        subcategory: "Общее".to_string(),
        question: question.to_string(),
        answer: format!("Ответ на вопрос {}", id),
        tags: Vec::new(),
    }
}

fn base_entries() -> Vec<Entry> {
    vec![
        entry("a", "Часы работы СтО?"),
        entry("b", "Где находится общежитие?"),
        entry("c", "Как подать заявление на справку?"),
    ]
}

fn encoder() -> Arc<dyn Encoder> {
    Arc::new(HashedEncoder::new(DIMENSION).expect("should create encoder"))
}

async fn build_and_save(entries: Vec<Entry>, dir: &Path) -> Catalog {
    let catalog = Catalog::from_entries(entries).expect("catalog should be valid");
    let encoder = encoder();
    let index = IndexBuilder::new(encoder.as_ref())
        .build(catalog.entries())
        .expect("should build index");
    store::save(&index, dir).await.expect("should save index");
    catalog
}

async fn loaded_engine(dir: &Path, catalog: &Catalog) -> RetrievalEngine {
    let engine = RetrievalEngine::new(encoder());
    engine
        .load_from(dir, catalog)
        .await
        .expect("should load index");
    engine
}

fn assert_self_retrieval(engine: &RetrievalEngine, catalog: &Catalog) {
    for entry in catalog.entries() {
        let results = engine
            .search(&entry.question, 3)
            .expect("search should succeed");
        let best = results.best().expect("should have a best hit");
        assert_eq!(best.entry.id, entry.id, "query: {}", entry.question);
        assert!(
            best.score >= 0.95,
            "self-retrieval score {} for {}",
            best.score,
            entry.id
        );
    }
}

#[tokio::test]
async fn exact_questions_retrieve_themselves_after_reload() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let catalog = build_and_save(base_entries(), temp_dir.path()).await;
    let engine = loaded_engine(temp_dir.path(), &catalog).await;

    assert_self_retrieval(&engine, &catalog);
}

#[tokio::test]
async fn results_are_bounded_and_descending() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let catalog = build_and_save(base_entries(), temp_dir.path()).await;
    let engine = loaded_engine(temp_dir.path(), &catalog).await;

    let results = engine
        .search("справка общежитие", 10)
        .expect("search should succeed");

    assert_eq!(results.len(), 3);
    assert!(results.is_short());
    assert_eq!(results.requested(), 10);
    for pair in results.hits().windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for hit in &results {
        assert!((-1.0..=1.0 + 1e-6).contains(&hit.score));
    }
}

#[tokio::test]
async fn reloaded_index_matches_fresh_build() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let catalog = Catalog::from_entries(base_entries()).expect("catalog should be valid");

    let fresh = RetrievalEngine::new(encoder());
    let index = IndexBuilder::new(fresh.encoder().as_ref())
        .build(catalog.entries())
        .expect("should build index");
    store::save(&index, temp_dir.path())
        .await
        .expect("should save index");
    fresh.install(index, &catalog).expect("should install");

    let reloaded = loaded_engine(temp_dir.path(), &catalog).await;

    for query in ["когда открыт студенческий офис", "общежитие", "справка"] {
        let expected = fresh.search(query, 3).expect("fresh search");
        let actual = reloaded.search(query, 3).expect("reloaded search");
        assert_eq!(expected.len(), actual.len());
        for (e, a) in expected.iter().zip(actual.iter()) {
            assert_eq!(e.entry.id, a.entry.id);
            assert!((e.score - a.score).abs() < 1e-6);
        }
    }
}

#[tokio::test]
async fn rebuild_with_new_entry_keeps_existing_rankings() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let catalog = build_and_save(base_entries(), temp_dir.path()).await;
    let engine = loaded_engine(temp_dir.path(), &catalog).await;
    assert_self_retrieval(&engine, &catalog);

    let mut extended = base_entries();
    extended.push(entry("d", "Когда открыта библиотека?"));
    let catalog = build_and_save(extended, temp_dir.path()).await;

    // The previous load is stale against the new catalog
    let rebuilt = loaded_engine(temp_dir.path(), &catalog).await;
    engine
        .load_from(temp_dir.path(), &catalog)
        .await
        .expect("live engine should swap to the rebuilt index");

    for engine in [&rebuilt, &engine] {
        let results = engine
            .search("Когда открыта библиотека?", 1)
            .expect("search should succeed");
        assert_eq!(results.best().map(|hit| hit.entry.id.as_str()), Some("d"));
        assert_self_retrieval(engine, &catalog);
    }
}

#[tokio::test]
async fn old_index_is_rejected_for_extended_catalog() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    build_and_save(base_entries(), temp_dir.path()).await;

    let mut extended = base_entries();
    extended.push(entry("d", "Когда открыта библиотека?"));
    let catalog = Catalog::from_entries(extended).expect("catalog should be valid");

    let engine = RetrievalEngine::new(encoder());
    let error = engine
        .load_from(temp_dir.path(), &catalog)
        .await
        .expect_err("stale index must be rejected");
    assert!(matches!(error, FaqError::IndexCorrupt(_)));
    assert!(error.needs_rebuild());
    assert!(!engine.is_ready());
}

#[tokio::test]
async fn index_is_rejected_after_an_entry_is_reworded() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    build_and_save(base_entries(), temp_dir.path()).await;

    let mut edited = base_entries();
    edited[0].question = "Как получить пропуск в библиотеку?".to_string();
    let catalog = Catalog::from_entries(edited).expect("catalog should be valid");

    let engine = RetrievalEngine::new(encoder());
    let error = engine
        .load_from(temp_dir.path(), &catalog)
        .await
        .expect_err("vectors for the old question must not be served");
    assert!(matches!(error, FaqError::IndexCorrupt(_)));
    assert!(error.needs_rebuild());
    assert!(!engine.is_ready());

    build_and_save(catalog.entries().to_vec(), temp_dir.path()).await;
    engine
        .load_from(temp_dir.path(), &catalog)
        .await
        .expect("rebuilt index matches the edited catalog");
    let results = engine
        .search("Как получить пропуск в библиотеку?", 1)
        .expect("search should succeed");
    let best = results.best().expect("should have a best hit");
    assert_eq!(best.entry.id, "a");
    assert!(best.score >= 0.95);
}

#[tokio::test]
async fn missing_index_is_not_found() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let catalog = Catalog::from_entries(base_entries()).expect("catalog should be valid");

    let engine = RetrievalEngine::new(encoder());
    let error = engine
        .load_from(&temp_dir.path().join("absent"), &catalog)
        .await
        .expect_err("missing index must fail");
    assert!(matches!(error, FaqError::IndexNotFound(_)));
    assert!(matches!(
        engine.search("общежитие", 1),
        Err(FaqError::EngineNotReady)
    ));
}

#[tokio::test]
async fn truncated_index_is_corrupt() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let catalog = build_and_save(base_entries(), temp_dir.path()).await;
    fs::remove_dir_all(temp_dir.path().join(store::VECTORS_DIR))
        .expect("should remove vectors");

    let engine = RetrievalEngine::new(encoder());
    let error = engine
        .load_from(temp_dir.path(), &catalog)
        .await
        .expect_err("half an index must fail");
    assert!(matches!(error, FaqError::IndexCorrupt(_)));
}

#[tokio::test]
async fn catalog_file_drives_the_whole_pipeline() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let catalog_path = temp_dir.path().join("faq.json");
    fs::write(
        &catalog_path,
        r#"{"dataset": [
            {"id": "a", "block": "Студенческий офис", "subblock": "Режим",
             "question": "Часы работы СтО?", "answer": "С 10 до 17.", "tags": ["расписание"]},
            {"id": "b", "block": "Общежитие", "subblock": "Адреса",
             "question": "Где находится общежитие?", "answer": "Беляево.", "tags": []}
        ]}"#,
    )
    .expect("should write catalog");

    let catalog = Catalog::from_path(&catalog_path).expect("catalog should load");
    let index_dir = temp_dir.path().join("index");
    build_and_save(catalog.entries().to_vec(), &index_dir).await;
    let engine = loaded_engine(&index_dir, &catalog).await;

    let results = engine
        .search("Где находится общежитие?", 5)
        .expect("search should succeed");
    let policy = ConfidencePolicy::new(TierPolicy::default()).expect("default tiers are valid");
    match policy.classify(results.hits()) {
        Decision::Direct(best) => {
            assert_eq!(best.entry.id, "b");
            assert_eq!(best.entry.answer, "Беляево.");
        }
        other => panic!("expected a direct answer, got {:?}", other),
    }
}

#[tokio::test]
async fn whitespace_query_is_rejected_after_load() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let catalog = build_and_save(base_entries(), temp_dir.path()).await;
    let engine = loaded_engine(temp_dir.path(), &catalog).await;

    assert!(matches!(
        engine.search("  \n", 3),
        Err(FaqError::InvalidQuery(_))
    ));
}
