use super::*;

fn entries(ids: &[&str]) -> Vec<Entry> {
    ids.iter()
        .map(|id| Entry {
            id: (*id).to_string(),
            category: "General".to_string(),
            subcategory: "Misc".to_string(),
            question: format!("Question {}?", id),
            answer: format!("Answer {}.", id),
            tags: Vec::new(),
        })
        .collect()
}

fn unit(values: &[f32]) -> Embedding {
    let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    values.iter().map(|x| x / norm).collect()
}

fn sample_index() -> FlatIndex {
    FlatIndex::from_vectors(
        3,
        &[
            unit(&[1.0, 0.0, 0.0]),
            unit(&[0.0, 1.0, 0.0]),
            unit(&[1.0, 1.0, 0.0]),
            unit(&[0.0, 0.0, 1.0]),
        ],
    )
    .expect("should build index")
}

#[test]
fn search_ranks_by_inner_product() {
    let index = sample_index();
    let hits = index
        .search(&unit(&[1.0, 0.2, 0.0]), 4)
        .expect("should search");

    let positions: Vec<usize> = hits.iter().map(|(p, _)| *p).collect();
    assert_eq!(positions, vec![0, 2, 1, 3]);
    assert!(hits.windows(2).all(|w| w[0].1 >= w[1].1));
}

#[test]
fn search_truncates_to_k() {
    let index = sample_index();
    assert_eq!(index.search(&unit(&[1.0, 0.0, 0.0]), 2).expect("search").len(), 2);
    assert_eq!(index.search(&unit(&[1.0, 0.0, 0.0]), 10).expect("search").len(), 4);
    assert!(index.search(&unit(&[1.0, 0.0, 0.0]), 0).expect("search").is_empty());
}

#[test]
fn ties_keep_position_order() {
    let index = FlatIndex::from_vectors(
        2,
        &[
            unit(&[0.0, 1.0]),
            unit(&[1.0, 0.0]),
            unit(&[0.0, 1.0]),
            unit(&[1.0, 0.0]),
        ],
    )
    .expect("should build index");

    let hits = index.search(&[1.0, 0.0], 4).expect("should search");
    let positions: Vec<usize> = hits.iter().map(|(p, _)| *p).collect();
    assert_eq!(positions, vec![1, 3, 0, 2]);
}

#[test]
fn scores_stay_within_cosine_bounds() {
    let index = sample_index();
    let hits = index
        .search(&unit(&[-1.0, -1.0, -1.0]), 4)
        .expect("should search");
    for (_, score) in hits {
        assert!((-1.0 - 1e-5..=1.0 + 1e-5).contains(&score), "score {}", score);
    }
}

#[test]
fn query_dimension_mismatch_is_rejected() {
    let index = sample_index();
    assert!(matches!(
        index.search(&[1.0, 0.0], 1),
        Err(FaqError::Embedding(_))
    ));
}

#[test]
fn from_vectors_validates_input() {
    assert!(FlatIndex::from_vectors(0, &[]).is_err());
    assert!(FlatIndex::from_vectors(2, &[vec![1.0, 0.0], vec![1.0]]).is_err());
    assert!(FlatIndex::from_vectors(2, &[vec![f32::NAN, 0.0]]).is_err());

    let empty = FlatIndex::from_vectors(4, &[]).expect("empty index is valid");
    assert!(empty.is_empty());
    assert_eq!(empty.len(), 0);
}

#[test]
fn vector_accessor() {
    let index = sample_index();
    assert_eq!(index.len(), 4);
    assert_eq!(index.vector(3), Some(&[0.0, 0.0, 1.0][..]));
    assert_eq!(index.vector(4), None);
    assert_eq!(index.vector(usize::MAX), None);
}

#[test]
fn vector_index_checks_id_count() {
    let result = VectorIndex::new(sample_index(), &entries(&["a"]), "model");
    assert!(matches!(result, Err(FaqError::IndexCorrupt(_))));
}

#[test]
fn vector_index_manifest() {
    let ids: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
    let catalog = entries(&["a", "b", "c", "d"]);
    let index = VectorIndex::new(sample_index(), &catalog, "fnv1a-ngram-3")
        .expect("should build vector index");

    let manifest = index.manifest();
    assert_eq!(manifest.format_version, FORMAT_VERSION);
    assert_eq!(manifest.model, "fnv1a-ngram-3");
    assert_eq!(manifest.dimension, 3);
    assert_eq!(manifest.count, 4);
    assert_eq!(index.entry_ids(), ids.as_slice());
    assert_eq!(index.entry_digests()[2], catalog[2].content_digest());
    assert_eq!(manifest.entry_digests[1], catalog[1].content_digest());
    assert_eq!(index.len(), 4);
}

#[test]
fn from_parts_rejects_dimension_mismatch() {
    let (flat, mut manifest) = VectorIndex::new(
        sample_index(),
        &entries(&["a", "b", "c", "d"]),
        "model",
    )
    .expect("should build vector index")
    .into_parts();
    manifest.dimension = 5;

    assert!(matches!(
        VectorIndex::from_parts(flat, manifest),
        Err(FaqError::IndexCorrupt(_))
    ));
}

#[test]
fn manifest_json_shape() {
    let index = VectorIndex::new(
        FlatIndex::from_vectors(2, &[vec![1.0, 0.0]]).expect("index"),
        &entries(&["only"]),
        "model",
    )
    .expect("should build vector index");

    let json = serde_json::to_value(index.manifest()).expect("should serialize");
    assert_eq!(json["entry_ids"], serde_json::json!(["only"]));
    assert_eq!(json["count"], 1);
    assert!(json["entry_digests"][0].is_string());
    assert!(json["built_at"].is_string());
}

#[test]
fn from_parts_rejects_missing_digests() {
    let (flat, mut manifest) =
        VectorIndex::new(sample_index(), &entries(&["a", "b", "c", "d"]), "model")
            .expect("should build vector index")
            .into_parts();
    manifest.entry_digests.pop();

    assert!(matches!(
        VectorIndex::from_parts(flat, manifest),
        Err(FaqError::IndexCorrupt(_))
    ));
}
