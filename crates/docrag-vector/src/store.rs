//! Persistent collections of embedded chunks.
//!
//! Each collection is one Lance table. Its vector width is fixed by the first
//! successful `add`, and the embedder that produced the vectors is recorded
//! in the shared `meta` table under `embedder:<collection>`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, Table};
use tracing::{debug, info};

use docrag_core::{ChunkMetadata, EmbeddingRecord, Error, Result, SearchHit};

use crate::schema::{build_records_schema, vector_dim, META_TABLE};
use crate::table::{delete_meta, ensure_meta_table, get_meta, open_db, set_meta, table_exists};

/// Handle on a LanceDB directory holding any number of collections.
pub struct IndexStore {
    conn: Connection,
    path: PathBuf,
}

impl IndexStore {
    /// Open (creating if needed) the store at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| Error::StoreUnavailable(format!("cannot create {}: {e}", path.display())))?;
        let conn = open_db(path.to_string_lossy().as_ref()).await?;
        ensure_meta_table(&conn, META_TABLE).await?;
        debug!(path = %path.display(), "opened index store");
        Ok(Self { conn, path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handle on collection `name`. Idempotent; existing contents are kept.
    /// The backing table appears with the first `add`.
    pub async fn open_or_create(&self, name: &str) -> Result<Collection> {
        let name = name.trim();
        if name.is_empty() || name == META_TABLE {
            return Err(Error::InvalidConfiguration(format!("invalid collection name '{name}'")));
        }
        let collection = Collection { conn: self.conn.clone(), name: name.to_string() };
        debug!(collection = name, dim = ?collection.dim().await?, "collection ready");
        Ok(collection)
    }

    /// Names of all collections in the store.
    pub async fn collections(&self) -> Result<Vec<String>> {
        let names = self.conn.table_names().execute().await.map_err(Error::store)?;
        Ok(names.into_iter().filter(|n| n != META_TABLE).collect())
    }
}

/// A named set of embedding records. Cheap to clone; state lives in the store.
#[derive(Clone)]
pub struct Collection {
    conn: Connection,
    name: String,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn table(&self) -> Result<Option<Table>> {
        if !table_exists(&self.conn, &self.name).await? {
            return Ok(None);
        }
        let table = self.conn.open_table(&self.name).execute().await.map_err(Error::store)?;
        Ok(Some(table))
    }

    /// Vector width, once the first record has been added.
    pub async fn dim(&self) -> Result<Option<usize>> {
        match self.table().await? {
            Some(table) => {
                let schema = table.schema().await.map_err(Error::store)?;
                Ok(vector_dim(&schema))
            }
            None => Ok(None),
        }
    }

    pub async fn count(&self) -> Result<usize> {
        match self.table().await? {
            Some(table) => table.count_rows(None).await.map_err(Error::store),
            None => Ok(0),
        }
    }

    fn embedder_key(&self) -> String {
        format!("embedder:{}", self.name)
    }

    /// Identity of the embedder whose vectors this collection holds.
    pub async fn embedder_id(&self) -> Result<Option<String>> {
        get_meta(&self.conn, META_TABLE, &self.embedder_key()).await
    }

    /// Fail with `EmbedderMismatch` if the collection is bound to another embedder.
    pub async fn check_embedder(&self, embedder_id: &str) -> Result<()> {
        match self.embedder_id().await? {
            Some(bound) if bound != embedder_id => {
                Err(Error::EmbedderMismatch { expected: bound, found: embedder_id.to_string() })
            }
            _ => Ok(()),
        }
    }

    /// Bind the collection to `embedder_id`, or confirm the existing binding.
    pub async fn bind_embedder(&self, embedder_id: &str) -> Result<()> {
        match self.embedder_id().await? {
            Some(_) => self.check_embedder(embedder_id).await,
            None => set_meta(&self.conn, META_TABLE, &self.embedder_key(), embedder_id).await,
        }
    }

    /// Append `records` in one commit. Nothing is written if any record has a
    /// taken id or a vector of the wrong width.
    pub async fn add(&self, records: &[EmbeddingRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let table = self.table().await?;
        let dim = match &table {
            Some(t) => vector_dim(&t.schema().await.map_err(Error::store)?)
                .ok_or_else(|| Error::StoreUnavailable(format!("{} has no vector column", self.name)))?,
            None => records[0].vector.len(),
        };
        if dim == 0 {
            return Err(Error::DimensionMismatch { expected: 1, found: 0 });
        }
        let mut batch_ids = HashSet::with_capacity(records.len());
        for record in records {
            if record.vector.len() != dim {
                return Err(Error::DimensionMismatch { expected: dim, found: record.vector.len() });
            }
            if !batch_ids.insert(record.id.as_str()) {
                return Err(Error::DuplicateId(record.id.clone()));
            }
        }

        let next_seq = match &table {
            Some(t) => {
                let (existing, max_seq) = scan_ids(t).await?;
                if let Some(dup) = records.iter().find(|r| existing.contains(&r.id)) {
                    return Err(Error::DuplicateId(dup.id.clone()));
                }
                max_seq.map_or(0, |s| s + 1)
            }
            None => 0,
        };

        let batch = records_to_batch(records, dim, next_seq)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        match table {
            Some(t) => {
                t.add(reader).execute().await.map_err(Error::store)?;
            }
            None => {
                self.conn.create_table(&self.name, reader).execute().await.map_err(Error::store)?;
            }
        }
        info!(collection = %self.name, added = records.len(), dim, "stored records");
        Ok(records.len())
    }

    /// The `k` records closest to `vector` by cosine distance, nearest first.
    /// Equal distances keep insertion order.
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(table) = self.table().await? else {
            return Ok(Vec::new());
        };
        let dim = vector_dim(&table.schema().await.map_err(Error::store)?)
            .ok_or_else(|| Error::StoreUnavailable(format!("{} has no vector column", self.name)))?;
        if vector.len() != dim {
            return Err(Error::DimensionMismatch { expected: dim, found: vector.len() });
        }

        let mut ranked: Vec<(f32, i64, SearchHit)> = Vec::new();
        let mut stream = table.query().execute().await.map_err(Error::store)?;
        while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await.map_err(Error::store)? {
            let ids = column::<StringArray>(&batch, "id")?;
            let seqs = column::<Int64Array>(&batch, "seq")?;
            let texts = column::<StringArray>(&batch, "text")?;
            let sources = column::<StringArray>(&batch, "source")?;
            let paths = column::<StringArray>(&batch, "source_path")?;
            let positions = column::<Int32Array>(&batch, "position_index")?;
            let totals = column::<Int32Array>(&batch, "total_chunks")?;
            let vectors = column::<FixedSizeListArray>(&batch, "vector")?;
            for i in 0..batch.num_rows() {
                if !vectors.is_valid(i) {
                    continue;
                }
                let inner = vectors.value(i);
                let distance = cosine_distance(vector, inner.as_primitive::<Float32Type>().values());
                let hit = SearchHit {
                    id: ids.value(i).to_string(),
                    text: texts.value(i).to_string(),
                    metadata: ChunkMetadata {
                        source: sources.value(i).to_string(),
                        source_path: paths.value(i).to_string(),
                        position_index: usize::try_from(positions.value(i)).map_err(Error::store)?,
                        total_chunks: usize::try_from(totals.value(i)).map_err(Error::store)?,
                    },
                    distance,
                };
                ranked.push((distance, seqs.value(i), hit));
            }
            if ranked.len() > k.saturating_mul(4) {
                rank(&mut ranked, k);
            }
        }
        rank(&mut ranked, k);
        debug!(collection = %self.name, k, returned = ranked.len(), "query");
        Ok(ranked.into_iter().map(|(_, _, hit)| hit).collect())
    }

    /// Remove every record and the embedder binding. The table schema, and
    /// with it the vector width, is kept.
    pub async fn clear(&self) -> Result<()> {
        if let Some(table) = self.table().await? {
            table.delete("true").await.map_err(Error::store)?;
        }
        delete_meta(&self.conn, META_TABLE, &self.embedder_key()).await?;
        info!(collection = %self.name, "cleared");
        Ok(())
    }
}

fn rank(ranked: &mut Vec<(f32, i64, SearchHit)>, k: usize) {
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    ranked.truncate(k);
}

/// `1 - cos(a, b)`; a zero vector on either side gives 1.0.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na.sqrt() * nb.sqrt())
}

async fn scan_ids(table: &Table) -> Result<(HashSet<String>, Option<i64>)> {
    let mut ids = HashSet::new();
    let mut max_seq: Option<i64> = None;
    let mut stream = table
        .query()
        .select(Select::columns(&["id", "seq"]))
        .execute()
        .await
        .map_err(Error::store)?;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await.map_err(Error::store)? {
        let id_col = column::<StringArray>(&batch, "id")?;
        let seq_col = column::<Int64Array>(&batch, "seq")?;
        for i in 0..batch.num_rows() {
            ids.insert(id_col.value(i).to_string());
            max_seq = Some(max_seq.map_or(seq_col.value(i), |m| m.max(seq_col.value(i))));
        }
    }
    Ok((ids, max_seq))
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| Error::StoreUnavailable(format!("missing or mistyped column '{name}'")))
}

fn to_i32(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::StoreUnavailable(format!("{what} {value} does not fit the store's Int32 column")))
}

fn records_to_batch(records: &[EmbeddingRecord], dim: usize, first_seq: i64) -> Result<RecordBatch> {
    let positions = records
        .iter()
        .map(|r| to_i32(r.metadata.position_index, "position_index"))
        .collect::<Result<Vec<i32>>>()?;
    let totals = records
        .iter()
        .map(|r| to_i32(r.metadata.total_chunks, "total_chunks"))
        .collect::<Result<Vec<i32>>>()?;
    let schema = build_records_schema(dim)?;
    let width = to_i32(dim, "vector width")?;
    let vectors = records.iter().map(|r| Some(r.vector.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.id.as_str()))),
            Arc::new(Int64Array::from_iter_values((0..records.len() as i64).map(|i| first_seq + i))),
            Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.text.as_str()))),
            Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.metadata.source.as_str()))),
            Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.metadata.source_path.as_str()))),
            Arc::new(Int32Array::from(positions)),
            Arc::new(Int32Array::from(totals)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, width)),
        ],
    )
    .map_err(Error::store)?;
    Ok(batch)
}
