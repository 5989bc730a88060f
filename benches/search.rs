use criterion::{Criterion, criterion_group, criterion_main};
use faq_retriever::catalog::{Catalog, Entry};
use faq_retriever::embeddings::{Encoder, HashedEncoder};
use faq_retriever::engine::RetrievalEngine;
use faq_retriever::index::IndexBuilder;
use std::hint::black_box;
use std::sync::Arc;

fn synthetic_catalog(size: usize) -> Catalog {
    let entries = (0..size)
        .map(|i| Entry {
            id: format!("entry-{}", i),
            category: format!("Category {}", i % 12),
            subcategory: format!("Section {}", i % 5),
            question: format!("How do I handle request number {} for service {}?", i, i % 37),
            answer: format!("Answer {}", i),
            tags: vec![format!("tag{}", i % 9)],
        })
        .collect();
    Catalog::from_entries(entries).expect("synthetic catalog is valid")
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let catalog = synthetic_catalog(2000);
    let encoder: Arc<dyn Encoder> = Arc::new(HashedEncoder::new(384).expect("valid dimension"));

    c.bench_function("build_2000", |b| {
        b.iter(|| {
            IndexBuilder::new(encoder.as_ref())
                .build(black_box(catalog.entries()))
                .expect("build succeeds")
        });
    });

    let index = IndexBuilder::new(encoder.as_ref())
        .build(catalog.entries())
        .expect("build succeeds");
    let engine = RetrievalEngine::new(Arc::clone(&encoder));
    engine.install(index, &catalog).expect("install succeeds");

    c.bench_function("search_top15_2000", |b| {
        b.iter(|| engine.search(black_box("handle request for service 12"), black_box(15)));
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
