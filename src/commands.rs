
use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::embeddings::encoder_from_config;
use crate::engine::{RetrievalEngine, SearchResults};
use crate::index::{IndexBuilder, IndexManifest, store};
use crate::policy::{ConfidencePolicy, Decision, DialogMode};

/// Answer preview length for ranked listings
const PREVIEW_CHARS: usize = 80;

/// Whether a persisted index still matches the catalog and encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSync {
    InSync,
    ModelChanged { indexed: String, configured: String },
    CatalogChanged {
        added: Vec<String>,
        removed: Vec<String>,
        /// Ids whose encoded text differs from what was indexed
        changed: Vec<String>,
    },
}

/// Per-category entry counts for a validated catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogReport {
    pub entries: usize,
    pub categories: Vec<CategoryReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryReport {
    pub name: String,
    pub entries: usize,
    pub subcategories: Vec<String>,
}

/// Encode the catalog and persist a fresh index
#[inline]
pub async fn build_index(
    config: &Config,
    catalog_path: Option<PathBuf>,
    index_dir: Option<PathBuf>,
) -> Result<()> {
    let catalog_path = catalog_path.unwrap_or_else(|| config.catalog_path().to_path_buf());
    let index_dir = index_dir.unwrap_or_else(|| config.index_dir().to_path_buf());

    let catalog = Catalog::from_path(&catalog_path)
        .with_context(|| format!("Failed to load catalog {}", catalog_path.display()))?;
    println!(
        "Loaded {} entries from {}",
        catalog.len(),
        catalog_path.display()
    );

    let encoder = encoder_from_config(config).context("Failed to set up encoder")?;
    println!("Encoding with {}", encoder.model_id());

    let progress = ProgressBar::new(catalog.len() as u64).with_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} Encoding entries")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let batch_size = config.ollama.batch_size as usize;

    let bar = progress.clone();
    let entries = catalog.entries().to_vec();
    let index = tokio::task::spawn_blocking(move || {
        IndexBuilder::new(encoder.as_ref())
            .with_batch_size(batch_size)
            .build_with_progress(&entries, |done, _| bar.set_position(done as u64))
    })
    .await
    .context("Index build task failed")?;
    progress.finish_and_clear();
    let index = index.context("Failed to build index")?;

    store::save(&index, &index_dir)
        .await
        .with_context(|| format!("Failed to save index to {}", index_dir.display()))?;

    info!("Index build complete");
    println!(
        "✓ Indexed {} entries ({} dimensions) into {}",
        index.len(),
        index.index().dimension(),
        index_dir.display()
    );
    Ok(())
}

/// Print the top `k` entries for `query`
#[inline]
pub async fn search(config: &Config, query: String, k: Option<usize>) -> Result<()> {
    let k = k.unwrap_or(config.retrieval.top_k);
    let engine = open_engine(config).await?;
    let results = run_search(engine, query.clone(), k).await?;

    if results.is_empty() {
        println!("No entries matched \"{}\".", query);
        return Ok(());
    }

    println!("Top {} results for \"{}\":", results.len(), query);
    println!();
    print_ranked(&results);

    if results.is_short() {
        println!();
        println!(
            "(requested {}, the knowledge base has only {} entries)",
            results.requested(),
            results.len()
        );
    }
    Ok(())
}

/// Search and classify, printing the response tier
#[inline]
pub async fn ask(config: &Config, query: String, mode: DialogMode) -> Result<()> {
    let policy = ConfidencePolicy::new(*config.policy.for_mode(mode))
        .with_context(|| format!("Invalid thresholds for mode '{}'", mode))?;
    let engine = open_engine(config).await?;
    let results = run_search(engine, query, config.retrieval.top_k).await?;

    match policy.classify(results.hits()) {
        Decision::Direct(best) => {
            println!(
                "✓ {} (score {:.3})",
                best.entry.question, best.score
            );
            println!();
            println!("{}", best.entry.answer);
        }
        Decision::Suggest(candidates) => {
            println!("Did you mean one of these?");
            println!();
            for (rank, candidate) in candidates.iter().enumerate() {
                println!(
                    "{:>3}. {} (score {:.3})",
                    rank + 1,
                    candidate.entry.question,
                    candidate.score
                );
            }
        }
        Decision::NoMatch => {
            println!("No answer found in the knowledge base.");
        }
    }
    Ok(())
}

/// Load the catalog and print a validation report
#[inline]
pub fn validate_catalog(config: &Config, catalog_path: Option<PathBuf>) -> Result<()> {
    let catalog_path = catalog_path.unwrap_or_else(|| config.catalog_path().to_path_buf());
    let catalog = Catalog::from_path(&catalog_path)
        .with_context(|| format!("Catalog {} is invalid", catalog_path.display()))?;
    let report = catalog_report(&catalog);

    println!("✓ {} is valid", catalog_path.display());
    println!("  Entries: {} (all ids unique)", report.entries);
    println!("  Categories: {}", report.categories.len());
    println!();
    for category in &report.categories {
        println!("📂 {} ({} entries)", category.name, category.entries);
        for subcategory in &category.subcategories {
            println!("   - {}", subcategory);
        }
    }
    Ok(())
}

/// Describe the persisted index and whether it matches the catalog
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    let index_dir = config.index_dir();
    println!("Index directory: {}", index_dir.display());

    let manifest = match store::read_manifest(index_dir).await {
        Ok(manifest) => manifest,
        Err(e) if e.needs_rebuild() => {
            println!("Index: {}", e);
            println!("Run 'faq-retriever build' to create it.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("  Model: {}", manifest.model);
    println!("  Dimension: {}", manifest.dimension);
    println!("  Entries: {}", manifest.count);
    println!(
        "  Built: {}",
        manifest.built_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    match Catalog::from_path(config.catalog_path()) {
        Ok(catalog) => match index_sync(&manifest, &catalog, &config.model_id()) {
            IndexSync::InSync => println!("✓ Index matches {}", config.catalog_path().display()),
            IndexSync::ModelChanged {
                indexed,
                configured,
            } => {
                println!(
                    "⚠ Index was built with '{}' but '{}' is configured; rebuild required",
                    indexed, configured
                );
            }
            IndexSync::CatalogChanged {
                added,
                removed,
                changed,
            } => {
                println!("⚠ Catalog changed since the last build; rebuild required");
                if !added.is_empty() {
                    println!("  Added: {}", added.join(", "));
                }
                if !removed.is_empty() {
                    println!("  Removed: {}", removed.join(", "));
                }
                if !changed.is_empty() {
                    println!("  Edited: {}", changed.join(", "));
                }
            }
        },
        Err(e) => {
            warn!("Could not load catalog for status: {}", e);
            println!("⚠ Catalog could not be loaded: {}", e);
        }
    }
    Ok(())
}

/// Compare a persisted manifest against the current catalog and encoder
#[inline]
pub fn index_sync(manifest: &IndexManifest, catalog: &Catalog, model_id: &str) -> IndexSync {
    if manifest.model != model_id {
        return IndexSync::ModelChanged {
            indexed: manifest.model.clone(),
            configured: model_id.to_string(),
        };
    }

    let indexed: HashMap<&str, &str> = manifest
        .entry_ids
        .iter()
        .map(String::as_str)
        .zip(manifest.entry_digests.iter().map(String::as_str))
        .collect();
    let current: HashSet<&str> = catalog.ids().collect();

    let added: Vec<String> = catalog
        .ids()
        .filter(|id| !indexed.contains_key(id))
        .map(str::to_string)
        .collect();
    let removed: Vec<String> = manifest
        .entry_ids
        .iter()
        .filter(|id| !current.contains(id.as_str()))
        .cloned()
        .collect();
    let changed: Vec<String> = catalog
        .entries()
        .iter()
        .filter(|entry| {
            indexed
                .get(entry.id.as_str())
                .is_some_and(|digest| *digest != entry.content_digest())
        })
        .map(|entry| entry.id.clone())
        .collect();

    if added.is_empty() && removed.is_empty() && changed.is_empty() {
        IndexSync::InSync
    } else {
        IndexSync::CatalogChanged {
            added,
            removed,
            changed,
        }
    }
}

#[inline]
pub fn catalog_report(catalog: &Catalog) -> CatalogReport {
    let categories = catalog
        .category_counts()
        .into_iter()
        .map(|(name, entries)| CategoryReport {
            name: name.to_string(),
            entries,
            subcategories: catalog
                .subcategories(name)
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
        .collect();

    CatalogReport {
        entries: catalog.len(),
        categories,
    }
}

async fn open_engine(config: &Config) -> Result<Arc<RetrievalEngine>> {
    let catalog = Catalog::from_path(config.catalog_path()).with_context(|| {
        format!(
            "Failed to load catalog {}",
            config.catalog_path().display()
        )
    })?;
    let encoder = encoder_from_config(config).context("Failed to set up encoder")?;
    let engine = RetrievalEngine::new(encoder);

    if let Err(e) = engine.load_from(config.index_dir(), &catalog).await {
        if e.needs_rebuild() {
            bail!("{}\nRun 'faq-retriever build' to (re)create the index.", e);
        }
        return Err(e).context("Failed to load index");
    }
    Ok(Arc::new(engine))
}

async fn run_search(
    engine: Arc<RetrievalEngine>,
    query: String,
    k: usize,
) -> Result<SearchResults> {
    // The first query may block on connecting to the encoder backend
    let results = tokio::task::spawn_blocking(move || engine.search(&query, k))
        .await
        .context("Search task failed")??;
    Ok(results)
}

fn print_ranked(results: &SearchResults) {
    for (rank, hit) in results.iter().enumerate() {
        println!(
            "{:>3}. [{:.3}] {} ({})",
            rank + 1,
            hit.score,
            hit.entry.question,
            hit.entry.id
        );
        println!("      {}", preview(&hit.entry.answer));
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}
