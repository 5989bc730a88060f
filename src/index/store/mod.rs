//! On-disk index persistence
//!
//! An index directory holds two artifacts that are only meaningful together:
//!
//! - `vectors/`: a LanceDB table with one row per index position
//!   (`position`, `entry_id`, `vector`)
//! - `entries.json`: the [`IndexManifest`], including the ordered entry ids
//!
//! Each row carries its own entry id so a table and manifest that drifted
//! apart are detected on load instead of silently answering with the wrong
//! entry. Saves go to a staging sibling that is renamed into place.


use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use super::{FORMAT_VERSION, FlatIndex, IndexManifest, VectorIndex};
use crate::embeddings::Embedding;
use crate::{FaqError, Result};

pub const VECTORS_DIR: &str = "vectors";
pub const MANIFEST_FILE: &str = "entries.json";
const TABLE_NAME: &str = "faq_vectors";

/// Persist `index` under `destination`, replacing whatever was there
#[inline]
pub async fn save(index: &VectorIndex, destination: &Path) -> Result<()> {
    let destination = std::path::absolute(destination)?;
    let (parent, name) = split_destination(&destination)?;

    let staging = parent.join(format!("{}.staging", name));
    let previous = parent.join(format!("{}.previous", name));

    if fs::try_exists(&staging).await? {
        debug!("Removing leftover staging directory {}", staging.display());
        fs::remove_dir_all(&staging).await?;
    }
    fs::create_dir_all(&staging).await?;

    write_vectors(index, &staging.join(VECTORS_DIR)).await?;

    let manifest_json = serde_json::to_string_pretty(index.manifest())
        .map_err(|e| FaqError::Database(format!("Failed to serialize manifest: {}", e)))?;
    fs::write(staging.join(MANIFEST_FILE), manifest_json).await?;

    swap_into_place(&staging, &destination, &previous).await?;

    info!(
        "Saved index with {} vectors to {}",
        index.len(),
        destination.display()
    );
    Ok(())
}

/// Load and cross-check an index previously written by [`save`]
#[inline]
pub async fn load(source: &Path) -> Result<VectorIndex> {
    let manifest = read_manifest(source).await?;
    let vectors_path = source.join(VECTORS_DIR);

    if manifest.format_version != FORMAT_VERSION {
        return Err(FaqError::IndexCorrupt(format!(
            "unsupported index format version {} (expected {})",
            manifest.format_version, FORMAT_VERSION
        )));
    }
    if manifest.count != manifest.entry_ids.len() {
        return Err(FaqError::IndexCorrupt(format!(
            "manifest count {} does not match its {} entry ids",
            manifest.count,
            manifest.entry_ids.len()
        )));
    }

    let vectors = read_vectors(&vectors_path, &manifest).await?;
    let index = FlatIndex::from_vectors(manifest.dimension, &vectors)
        .map_err(|e| FaqError::IndexCorrupt(e.to_string()))?;

    let loaded = VectorIndex::from_parts(index, manifest)?;
    info!(
        "Loaded index with {} vectors (model {}) from {}",
        loaded.len(),
        loaded.model(),
        source.display()
    );
    Ok(loaded)
}

/// Read only the manifest, checking that both artifacts are present
#[inline]
pub async fn read_manifest(source: &Path) -> Result<IndexManifest> {
    if !fs::try_exists(source).await? {
        return Err(FaqError::IndexNotFound(source.to_path_buf()));
    }

    let vectors_path = source.join(VECTORS_DIR);
    let manifest_path = source.join(MANIFEST_FILE);
    let has_vectors = fs::try_exists(&vectors_path).await?;
    let has_manifest = fs::try_exists(&manifest_path).await?;

    match (has_vectors, has_manifest) {
        (false, false) => return Err(FaqError::IndexNotFound(source.to_path_buf())),
        (true, false) => {
            return Err(FaqError::IndexCorrupt(format!(
                "{} is missing next to {}",
                MANIFEST_FILE,
                vectors_path.display()
            )));
        }
        (false, true) => {
            return Err(FaqError::IndexCorrupt(format!(
                "{} is missing next to {}",
                VECTORS_DIR,
                manifest_path.display()
            )));
        }
        (true, true) => {}
    }

    let content = fs::read_to_string(&manifest_path).await.map_err(|e| {
        FaqError::IndexCorrupt(format!("cannot read {}: {}", manifest_path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        FaqError::IndexCorrupt(format!("cannot parse {}: {}", manifest_path.display(), e))
    })
}

fn split_destination(destination: &Path) -> Result<(PathBuf, String)> {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            FaqError::Database(format!(
                "index destination {} has no directory name",
                destination.display()
            ))
        })?;
    let parent = destination
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    Ok((parent, name))
}

async fn swap_into_place(staging: &Path, destination: &Path, previous: &Path) -> Result<()> {
    if fs::try_exists(previous).await? {
        fs::remove_dir_all(previous).await?;
    }

    let replaced = fs::try_exists(destination).await?;
    if replaced {
        fs::rename(destination, previous).await?;
    }

    if let Err(e) = fs::rename(staging, destination).await {
        if replaced {
            if let Err(restore) = fs::rename(previous, destination).await {
                warn!(
                    "Failed to restore previous index to {}: {}",
                    destination.display(),
                    restore
                );
            }
        }
        return Err(e.into());
    }

    if replaced {
        if let Err(e) = fs::remove_dir_all(previous).await {
            warn!(
                "Failed to remove previous index at {}: {}",
                previous.display(),
                e
            );
        }
    }
    Ok(())
}

fn vector_width(dimension: usize) -> Result<i32> {
    i32::try_from(dimension)
        .map_err(|_| FaqError::Database(format!("vector dimension {} is too large", dimension)))
}

fn vectors_schema(dimension: usize) -> Result<SchemaRef> {
    let width = vector_width(dimension)?;
    Ok(Arc::new(Schema::new(vec![
        Field::new("position", DataType::UInt32, false),
        Field::new("entry_id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                width,
            ),
            false,
        ),
    ])))
}

async fn connect(path: &Path) -> Result<Connection> {
    let uri = format!("file://{}", std::path::absolute(path)?.display());
    lancedb::connect(&uri)
        .execute()
        .await
        .map_err(|e| FaqError::Database(format!("Failed to connect to LanceDB: {}", e)))
}

async fn write_vectors(index: &VectorIndex, path: &Path) -> Result<()> {
    let flat = index.index();
    let dimension = flat.dimension();
    let schema = vectors_schema(dimension)?;

    let connection = connect(path).await?;
    let table = connection
        .create_empty_table(TABLE_NAME, Arc::clone(&schema))
        .execute()
        .await
        .map_err(|e| FaqError::Database(format!("Failed to create table: {}", e)))?;

    if index.is_empty() {
        return Ok(());
    }

    let positions = (0..index.len())
        .map(|p| {
            u32::try_from(p).map_err(|_| {
                FaqError::Database(format!("index position {} does not fit in u32", p))
            })
        })
        .collect::<Result<Vec<u32>>>()?;
    let entry_ids: Vec<&str> = index.entry_ids().iter().map(String::as_str).collect();
    let values: Vec<f32> = flat.iter().flatten().copied().collect();

    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        vector_width(dimension)?,
        Arc::new(Float32Array::from(values)),
        None,
    )
    .map_err(|e| FaqError::Database(format!("Failed to create vector array: {}", e)))?;

    let batch = RecordBatch::try_new(
        Arc::clone(&schema),
        vec![
            Arc::new(UInt32Array::from(positions)),
            Arc::new(StringArray::from(entry_ids)),
            Arc::new(vector_array),
        ],
    )
    .map_err(|e| FaqError::Database(format!("Failed to create record batch: {}", e)))?;

    let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
    table
        .add(reader)
        .execute()
        .await
        .map_err(|e| FaqError::Database(format!("Failed to insert vectors: {}", e)))?;

    debug!("Wrote {} vectors to {}", index.len(), path.display());
    Ok(())
}

async fn read_vectors(path: &Path, manifest: &IndexManifest) -> Result<Vec<Embedding>> {
    let corrupt = |what: &str, e: &dyn std::fmt::Display| {
        FaqError::IndexCorrupt(format!("{} at {}: {}", what, path.display(), e))
    };

    let connection = connect(path)
        .await
        .map_err(|e| corrupt("cannot open vector table", &e))?;
    let table = connection
        .open_table(TABLE_NAME)
        .execute()
        .await
        .map_err(|e| corrupt("cannot open vector table", &e))?;

    let row_count = table
        .count_rows(None)
        .await
        .map_err(|e| corrupt("cannot count vectors", &e))?;
    if row_count != manifest.count {
        return Err(FaqError::IndexCorrupt(format!(
            "vector table holds {} rows but the manifest lists {} entry ids",
            row_count, manifest.count
        )));
    }

    if manifest.count == 0 {
        return Ok(Vec::new());
    }
    let mut slots: Vec<Option<Embedding>> = vec![None; manifest.count];

    let mut stream = table
        .query()
        .limit(row_count)
        .execute()
        .await
        .map_err(|e| corrupt("cannot read vectors", &e))?;

    while let Some(batch) = stream
        .try_next()
        .await
        .map_err(|e| corrupt("cannot read vectors", &e))?
    {
        read_batch(&batch, manifest, &mut slots)?;
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(position, slot)| {
            slot.ok_or_else(|| {
                FaqError::IndexCorrupt(format!("no vector stored for position {}", position))
            })
        })
        .collect()
}

fn read_batch(
    batch: &RecordBatch,
    manifest: &IndexManifest,
    slots: &mut [Option<Embedding>],
) -> Result<()> {
    let positions = column::<UInt32Array>(batch, "position")?;
    let entry_ids = column::<StringArray>(batch, "entry_id")?;
    let vectors = column::<FixedSizeListArray>(batch, "vector")?;

    if vectors.value_length() as usize != manifest.dimension {
        return Err(FaqError::IndexCorrupt(format!(
            "stored vectors have {} dimensions, manifest says {}",
            vectors.value_length(),
            manifest.dimension
        )));
    }

    for row in 0..batch.num_rows() {
        let position = positions.value(row) as usize;
        let slot = slots.get_mut(position).ok_or_else(|| {
            FaqError::IndexCorrupt(format!(
                "position {} is outside 0..{}",
                position, manifest.count
            ))
        })?;
        if slot.is_some() {
            return Err(FaqError::IndexCorrupt(format!(
                "position {} is stored more than once",
                position
            )));
        }

        let stored_id = entry_ids.value(row);
        let expected_id = &manifest.entry_ids[position];
        if stored_id != expected_id {
            return Err(FaqError::IndexCorrupt(format!(
                "position {} holds entry '{}' but the manifest lists '{}'",
                position, stored_id, expected_id
            )));
        }

        let values = vectors.value(row);
        let values = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| FaqError::IndexCorrupt("vector values are not f32".to_string()))?;
        *slot = Some(values.values().to_vec());
    }

    Ok(())
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| FaqError::IndexCorrupt(format!("vector table has no '{}' column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| FaqError::IndexCorrupt(format!("column '{}' has an unexpected type", name)))
}
