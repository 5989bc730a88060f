use super::*;
use std::fs;
use tempfile::TempDir;

fn sample_catalog_json() -> &'static str {
    r#"{
        "dataset": [
            {
                "id": "sto-hours",
                "block": "Студенческий офис",
                "subblock": "Режим работы",
                "question": "Часы работы СтО?",
                "answer": "СтО работает с 10:00 до 17:00 по будням.",
                "tags": ["расписание", "офис"]
            },
            {
                "id": "dorm-location",
                "block": "Общежитие",
                "subblock": "Адреса",
                "question": "Где находится общежитие?",
                "answer": "Общежития расположены в Беляево и Металлургов.",
                "tags": []
            },
            {
                "id": "certificate",
                "block": "Студенческий офис",
                "subblock": "Справки",
                "question": "Как подать заявление на справку?",
                "answer": "Заявление подаётся через личный кабинет.",
                "tags": ["справка"]
            }
        ]
    }"#
}

fn expect_malformed(result: Result<Catalog>, needle: &str) {
    match result {
        Err(FaqError::MalformedCatalog(message)) => assert!(
            message.contains(needle),
            "expected '{}' in message, got: {}",
            needle,
            message
        ),
        other => panic!("expected MalformedCatalog, got {:?}", other),
    }
}

#[test]
fn parse_valid_catalog() {
    let catalog = Catalog::parse(sample_catalog_json()).expect("catalog should parse");

    assert_eq!(catalog.len(), 3);
    assert!(!catalog.is_empty());
    assert_eq!(
        catalog.ids().collect::<Vec<_>>(),
        vec!["sto-hours", "dorm-location", "certificate"]
    );

    let entry = catalog.get("dorm-location").expect("entry should exist");
    assert_eq!(entry.category, "Общежитие");
    assert_eq!(entry.subcategory, "Адреса");
    assert!(entry.tags.is_empty());
}

#[test]
fn canonical_text_joins_question_and_tags() {
    let catalog = Catalog::parse(sample_catalog_json()).expect("catalog should parse");

    let with_tags = catalog.get("sto-hours").expect("entry should exist");
    assert_eq!(with_tags.canonical_text(), "Часы работы СтО? расписание офис");

    let without_tags = catalog.get("dorm-location").expect("entry should exist");
    assert_eq!(without_tags.canonical_text(), "Где находится общежитие?");
}

#[test]
fn content_digest_tracks_encoded_text_only() {
    let catalog = Catalog::parse(sample_catalog_json()).expect("catalog should parse");
    let original = catalog.get("sto-hours").expect("entry should exist").clone();

    let digest = original.content_digest();
    assert_eq!(digest.len(), 16);
    assert_eq!(digest, original.clone().content_digest());

    let mut reanswered = original.clone();
    reanswered.answer = "Другой ответ.".to_string();
    reanswered.category = "Другой блок".to_string();
    assert_eq!(reanswered.content_digest(), digest);

    let mut requestioned = original.clone();
    requestioned.question = "Как получить пропуск в библиотеку?".to_string();
    assert_ne!(requestioned.content_digest(), digest);

    let mut retagged = original;
    retagged.tags.push("новый".to_string());
    assert_ne!(retagged.content_digest(), digest);
}

#[test]
fn canonical_text_is_trimmed_and_excludes_answer() {
    let entry = Entry {
        id: "x".to_string(),
        category: "Category".to_string(),
        subcategory: "Sub".to_string(),
        question: "  padded question ".to_string(),
        answer: "secret answer".to_string(),
        tags: vec![],
    };

    let text = entry.canonical_text();
    assert_eq!(text, "padded question");
    assert!(!text.contains("secret"));
    assert!(!text.contains("Category"));
}

#[test]
fn missing_field_rejects_catalog() {
    let json = r#"{"dataset": [
        {"id": "a", "block": "b", "subblock": "s", "question": "q?", "tags": []}
    ]}"#;
    expect_malformed(Catalog::parse(json), "'answer'");
}

#[test]
fn missing_tags_field_rejects_catalog() {
    let json = r#"{"dataset": [
        {"id": "a", "block": "b", "subblock": "s", "question": "q?", "answer": "a"}
    ]}"#;
    expect_malformed(Catalog::parse(json), "'tags'");
}

#[test]
fn empty_question_rejects_catalog() {
    let json = r#"{"dataset": [
        {"id": "a", "block": "b", "subblock": "s", "question": "   ", "answer": "a", "tags": []}
    ]}"#;
    expect_malformed(Catalog::parse(json), "'question'");
}

#[test]
fn duplicate_ids_reject_catalog() {
    let json = r#"{"dataset": [
        {"id": "a", "block": "b", "subblock": "s", "question": "one?", "answer": "1", "tags": []},
        {"id": "a", "block": "b", "subblock": "s", "question": "two?", "answer": "2", "tags": []}
    ]}"#;
    expect_malformed(Catalog::parse(json), "duplicate id 'a'");
}

#[test]
fn one_bad_entry_fails_whole_load() {
    let json = r#"{"dataset": [
        {"id": "a", "block": "b", "subblock": "s", "question": "one?", "answer": "1", "tags": []},
        {"id": "b", "block": "b", "subblock": "s", "question": "two?", "answer": "", "tags": []},
        {"id": "c", "block": "b", "subblock": "s", "question": "three?", "answer": "3", "tags": []}
    ]}"#;
    expect_malformed(Catalog::parse(json), "entry #1");
}

#[test]
fn missing_dataset_key() {
    expect_malformed(Catalog::parse(r#"{"items": []}"#), "'dataset'");
}

#[test]
fn empty_dataset_rejected() {
    expect_malformed(Catalog::parse(r#"{"dataset": []}"#), "no entries");
}

#[test]
fn invalid_json_rejected() {
    expect_malformed(Catalog::parse("{not json"), "invalid JSON");
}

#[test]
fn wrong_tag_type_rejected() {
    let json = r#"{"dataset": [
        {"id": "a", "block": "b", "subblock": "s", "question": "q?", "answer": "a", "tags": "oops"}
    ]}"#;
    expect_malformed(Catalog::parse(json), "invalid JSON");
}

#[test]
fn categories_preserve_first_appearance() {
    let catalog = Catalog::parse(sample_catalog_json()).expect("catalog should parse");

    assert_eq!(catalog.categories(), vec!["Студенческий офис", "Общежитие"]);
    assert_eq!(
        catalog.subcategories("Студенческий офис"),
        vec!["Режим работы", "Справки"]
    );
    assert_eq!(catalog.entries_in("Общежитие").count(), 1);
    assert_eq!(catalog.entries_in("Unknown").count(), 0);
}

#[test]
fn category_counts_sorted_by_name() {
    let catalog = Catalog::parse(sample_catalog_json()).expect("catalog should parse");

    assert_eq!(
        catalog.category_counts(),
        vec![("Общежитие", 1), ("Студенческий офис", 2)]
    );
}

#[test]
fn from_path_reads_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("faq.json");
    fs::write(&path, sample_catalog_json()).expect("should write catalog");

    let catalog = Catalog::from_path(&path).expect("catalog should load");
    assert_eq!(catalog.len(), 3);
}

#[test]
fn from_path_missing_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    expect_malformed(
        Catalog::from_path(temp_dir.path().join("absent.json")),
        "cannot read",
    );
}

#[test]
fn entry_serializes_with_catalog_field_names() {
    let catalog = Catalog::parse(sample_catalog_json()).expect("catalog should parse");
    let entry = catalog.get("certificate").expect("entry should exist");

    let json = serde_json::to_value(entry).expect("entry should serialize");
    assert_eq!(json["block"], "Студенческий офис");
    assert_eq!(json["subblock"], "Справки");
    assert!(json.get("category").is_none());
}
