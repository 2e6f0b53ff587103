use std::path::Path;

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};

use crate::error::{Error, Result};

const EMBEDDINGS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("embeddings");

/// Header size: 4 bytes dimension.
const HEADER_SIZE: usize = 4;

/// Stores one embedding vector per corpus document, keyed by document index.
///
/// Binary format per entry:
/// - 4 bytes: embedding dimension D (u32 LE)
/// - D * 4 bytes: f32 LE values
pub struct EmbeddingStore {
    db: Database,
}

impl EmbeddingStore {
    /// Open or create an embedding store at the given path.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use dongyo::EmbeddingStore;
    ///
    /// let store = EmbeddingStore::open(&tmp.path().join("embeddings.redb")).unwrap();
    /// assert_eq!(store.len().unwrap(), 0);
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(EMBEDDINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Open a store that must already exist on disk.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::NotFound {
                kind: "embedding index",
                name: path.display().to_string(),
            });
        }
        Self::open(path)
    }

    /// Store the embedding vector for a document.
    pub fn store(&self, index: u64, vector: &[f32]) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(EMBEDDINGS)?;
            table.insert(index, encode(vector).as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Store multiple vectors in a single transaction.
    pub fn batch_store(&self, entries: &[(u64, Vec<f32>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(EMBEDDINGS)?;
            for (index, vector) in entries {
                table.insert(*index, encode(vector).as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Retrieve the vector for a document, or None if missing or corrupt.
    pub fn load(&self, index: u64) -> Result<Option<Vec<f32>>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;

        let Some(guard) = table.get(index)? else {
            return Ok(None);
        };
        Ok(decode(guard.value()))
    }

    /// Remove every entry with an index at or above `len`.
    pub fn truncate(&self, len: u64) -> Result<usize> {
        let stale: Vec<u64> =
            self.list_ids()?.into_iter().filter(|&id| id >= len).collect();
        if stale.is_empty() {
            return Ok(0);
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(EMBEDDINGS)?;
            for &id in &stale {
                table.remove(id)?;
            }
        }
        txn.commit()?;
        Ok(stale.len())
    }

    /// List all stored document indices in ascending order.
    pub fn list_ids(&self) -> Result<Vec<u64>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, _) = entry?;
            result.push(k.value());
        }
        Ok(result)
    }

    pub fn len(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;
        Ok(table.len()? as usize)
    }

    /// Read the whole store into a dense matrix.
    ///
    /// Indices must run contiguously from 0 and every vector must share one
    /// dimension; anything else is a [`Error::Format`].
    pub fn load_matrix(&self) -> Result<EmbeddingMatrix> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;

        let mut dimension = None;
        let mut data = Vec::new();
        for (expected, entry) in table.iter()?.enumerate() {
            let (k, v) = entry?;
            let index = k.value();
            if index != expected as u64 {
                return Err(Error::Format(format!(
                    "embedding index has no vector for document {expected}"
                )));
            }
            let vector = decode(v.value()).ok_or_else(|| {
                Error::Format(format!(
                    "embedding for document {index} is corrupt"
                ))
            })?;
            match dimension {
                None => dimension = Some(vector.len()),
                Some(d) if d != vector.len() => {
                    return Err(Error::Format(format!(
                        "embedding for document {index} has dimension {}, expected {d}",
                        vector.len()
                    )));
                }
                Some(_) => {}
            }
            data.extend_from_slice(&vector);
        }

        Ok(EmbeddingMatrix {
            dimension: dimension.unwrap_or(0),
            data,
        })
    }
}

impl std::fmt::Debug for EmbeddingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingStore").finish_non_exhaustive()
    }
}

fn encode(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_SIZE + size_of_val(vector));
    bytes.extend_from_slice(&(vector.len() as u32).to_le_bytes());
    bytes.extend_from_slice(bytemuck::cast_slice(vector));
    bytes
}

fn decode(bytes: &[u8]) -> Option<Vec<f32>> {
    let header: [u8; HEADER_SIZE] = bytes.get(..HEADER_SIZE)?.try_into().ok()?;
    let dimension = u32::from_le_bytes(header) as usize;
    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != dimension * 4 {
        return None;
    }
    // The payload is not guaranteed to be 4-byte aligned.
    Some(
        payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Dense row-major embedding matrix, one row per document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingMatrix {
    pub dimension: usize,
    /// Flat array: `data[index * dimension + component]`.
    pub data: Vec<f32>,
}

impl EmbeddingMatrix {
    /// Build a matrix from per-document rows, checking they agree on
    /// dimension.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let dimension = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * dimension);
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != dimension {
                return Err(Error::Format(format!(
                    "embedding for document {index} has dimension {}, expected {dimension}",
                    row.len()
                )));
            }
            data.extend(row);
        }
        Ok(Self { dimension, data })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the embedding vector for a specific document.
    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.dimension;
        &self.data[start..start + self.dimension]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, EmbeddingStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            EmbeddingStore::open(&tmp.path().join("embeddings.redb")).unwrap();
        (tmp, store)
    }

    #[test]
    fn store_and_load() {
        let (_tmp, store) = test_store();

        store.store(3, &[0.5, -1.0, 2.0]).unwrap();

        assert_eq!(store.load(3).unwrap(), Some(vec![0.5, -1.0, 2.0]));
        assert!(store.load(4).unwrap().is_none());
    }

    #[test]
    fn load_matrix_is_dense_and_ordered() {
        let (_tmp, store) = test_store();

        store
            .batch_store(&[
                (1, vec![3.0, 4.0]),
                (0, vec![1.0, 2.0]),
                (2, vec![5.0, 6.0]),
            ])
            .unwrap();

        let matrix = store.load_matrix().unwrap();
        assert_eq!(matrix.dimension, 2);
        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix.row(0), &[1.0, 2.0]);
        assert_eq!(matrix.row(2), &[5.0, 6.0]);
    }

    #[test]
    fn load_matrix_rejects_gaps() {
        let (_tmp, store) = test_store();

        store
            .batch_store(&[(0, vec![1.0]), (2, vec![2.0])])
            .unwrap();

        let err = store.load_matrix().unwrap_err();
        assert!(
            matches!(err, Error::Format(ref msg) if msg.contains("document 1"))
        );
    }

    #[test]
    fn load_matrix_rejects_mixed_dimensions() {
        let (_tmp, store) = test_store();

        store
            .batch_store(&[(0, vec![1.0, 2.0]), (1, vec![3.0])])
            .unwrap();

        assert!(matches!(store.load_matrix(), Err(Error::Format(_))));
    }

    #[test]
    fn empty_store_yields_empty_matrix() {
        let (_tmp, store) = test_store();

        let matrix = store.load_matrix().unwrap();
        assert!(matrix.is_empty());
        assert_eq!(matrix.dimension, 0);
    }

    #[test]
    fn open_existing_requires_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err =
            EmbeddingStore::open_existing(&tmp.path().join("missing.redb"))
                .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn truncate_removes_stale_entries() {
        let (_tmp, store) = test_store();

        store
            .batch_store(&[(0, vec![1.0]), (1, vec![2.0]), (2, vec![3.0])])
            .unwrap();

        assert_eq!(store.truncate(2).unwrap(), 1);
        assert_eq!(store.list_ids().unwrap(), vec![0, 1]);
        assert_eq!(store.truncate(2).unwrap(), 0);
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("embeddings.redb");

        {
            let store = EmbeddingStore::open(&path).unwrap();
            store.store(0, &[1.0, 2.0]).unwrap();
        }

        {
            let store = EmbeddingStore::open_existing(&path).unwrap();
            assert_eq!(store.load(0).unwrap(), Some(vec![1.0, 2.0]));
            assert_eq!(store.len().unwrap(), 1);
        }
    }

    #[test]
    fn from_rows_checks_dimension() {
        assert!(EmbeddingMatrix::from_rows(vec![vec![1.0], vec![1.0, 2.0]])
            .is_err());
        let matrix =
            EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0]])
                .unwrap();
        assert_eq!(matrix.len(), 2);
    }
}
