//! Ordered key-value store backing the index.
//!
//! The contract is small: point gets, forward iteration by one-byte prefix,
//! forward iteration over an inclusive key range, atomic multi-put batches,
//! and two open modes. The index is built once and then served read-only,
//! so the store keeps the whole ordered map in memory and seals it into a
//! single length-prefixed segment file on [`Store::compact`]; a read-only
//! open loads that file back. Point gets against the in-memory map need no
//! extra filtering structure even for multi-million-key corpora.
//!
//! On top of the raw byte map sit the typed accessors for the three record
//! blobs (`StoredFeature`, `StoredCells`, `IndexInfos`), all CBOR.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::ops::Bound::{self, Excluded, Included, Unbounded};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::error::{FenceError, Result};
use crate::keys;
use crate::types::{Feature, IndexInfos, StoredCells, StoredFeature};

const SEGMENT_MAGIC: &[u8; 4] = b"PLFS";
const SEGMENT_VERSION: u8 = 1;

/// A batch of puts applied atomically; groups all writes for one feature.
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<(Vec<u8>, Bytes)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Bytes>) {
        self.ops.push((key.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Ordered map of raw records, optionally bound to a segment file.
pub struct Store {
    map: BTreeMap<Vec<u8>, Bytes>,
    path: Option<PathBuf>,
    read_only: bool,
}

impl Store {
    /// Creates an empty writable store with no backing file (tests and
    /// single-process pipelines).
    pub fn memory() -> Store {
        Store {
            map: BTreeMap::new(),
            path: None,
            read_only: false,
        }
    }

    /// Creates an empty writable store that [`Store::compact`] seals into
    /// `path`. An existing file at that path is replaced on compaction.
    pub fn create<P: AsRef<Path>>(path: P) -> Store {
        Store {
            map: BTreeMap::new(),
            path: Some(path.as_ref().to_path_buf()),
            read_only: false,
        }
    }

    /// Opens a sealed segment file read-only.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Store> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != SEGMENT_MAGIC {
            return Err(FenceError::Corruption(format!(
                "bad segment magic in {}",
                path.display()
            )));
        }
        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != SEGMENT_VERSION {
            return Err(FenceError::Corruption(format!(
                "unsupported segment version {}",
                version[0]
            )));
        }
        let mut count_buf = [0u8; 8];
        reader.read_exact(&mut count_buf)?;
        let count = u64::from_le_bytes(count_buf);

        let mut map = BTreeMap::new();
        let mut len_buf = [0u8; 4];
        for _ in 0..count {
            reader.read_exact(&mut len_buf)?;
            let klen = u32::from_le_bytes(len_buf) as usize;
            reader.read_exact(&mut len_buf)?;
            let vlen = u32::from_le_bytes(len_buf) as usize;
            let mut key = vec![0u8; klen];
            reader.read_exact(&mut key)?;
            let mut value = vec![0u8; vlen];
            reader.read_exact(&mut value)?;
            map.insert(key, Bytes::from(value));
        }

        info!(path = %path.display(), records = map.len(), "opened store read-only");
        Ok(Store {
            map,
            path: Some(path),
            read_only: true,
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Point get.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.map.get(key).cloned()
    }

    /// Forward iteration over every record whose key starts with `prefix`.
    pub fn iter_prefix(&self, prefix: u8) -> impl Iterator<Item = (&[u8], &Bytes)> {
        let lower = [prefix];
        let upper = [prefix.saturating_add(1)];
        let bounds: (Bound<&[u8]>, Bound<&[u8]>) = if prefix == u8::MAX {
            (Included(lower.as_slice()), Unbounded)
        } else {
            (Included(lower.as_slice()), Excluded(upper.as_slice()))
        };
        self.map
            .range::<[u8], _>(bounds)
            .map(|(k, v)| (k.as_slice(), v))
    }

    /// Forward iteration over the inclusive key range `[start, end]`.
    pub fn iter_range<'a>(
        &'a self,
        start: &'a [u8],
        end: &'a [u8],
    ) -> impl Iterator<Item = (&'a [u8], &'a Bytes)> + 'a {
        self.map
            .range::<[u8], _>((Included(start), Included(end)))
            .map(|(k, v)| (k.as_slice(), v))
    }

    /// Applies every put in `batch`. All records land or none do: the map is
    /// only touched after the batch has been fully staged.
    pub fn apply(&mut self, batch: WriteBatch) -> Result<()> {
        if self.read_only {
            return Err(FenceError::ReadOnly);
        }
        for (key, value) in batch.ops {
            self.map.insert(key, value);
        }
        Ok(())
    }

    /// Seals the current contents into the segment file (if one is bound)
    /// and flips the store read-only.
    pub fn compact(&mut self) -> Result<()> {
        if let Some(path) = &self.path {
            let tmp = path.with_extension("seg.tmp");
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            let mut writer = BufWriter::new(file);

            writer.write_all(SEGMENT_MAGIC)?;
            writer.write_all(&[SEGMENT_VERSION])?;
            writer.write_all(&(self.map.len() as u64).to_le_bytes())?;
            for (key, value) in &self.map {
                writer.write_all(&(key.len() as u32).to_le_bytes())?;
                writer.write_all(&(value.len() as u32).to_le_bytes())?;
                writer.write_all(key)?;
                writer.write_all(value)?;
            }
            writer.flush()?;
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
            std::fs::rename(&tmp, path)?;
            info!(path = %path.display(), records = self.map.len(), "sealed store");
        }
        self.read_only = true;
        Ok(())
    }

    // Typed accessors ------------------------------------------------------

    /// Loads and decodes one feature blob.
    pub fn load_feature(&self, id: u32) -> Result<Feature> {
        let raw = self
            .get(&keys::feature_key(id))
            .ok_or(FenceError::FeatureNotFound(id))?;
        let stored: StoredFeature = decode_cbor(&raw)
            .map_err(|e| FenceError::Corruption(format!("feature {id}: {e}")))?;
        Feature::from_stored(&stored)
    }

    /// Streams every feature blob to `add`, in id order.
    pub fn load_all_features<F>(&self, mut add: F) -> Result<()>
    where
        F: FnMut(u32, StoredFeature) -> Result<()>,
    {
        for (key, value) in self.iter_prefix(keys::FEATURE_PREFIX) {
            let id = keys::id_from_key(key)?;
            let stored: StoredFeature = decode_cbor(value)
                .map_err(|e| FenceError::Corruption(format!("feature {id}: {e}")))?;
            add(id, stored)?;
        }
        Ok(())
    }

    /// Streams every cover-cell blob to `add`, in id order.
    pub fn load_feature_cells<F>(&self, mut add: F) -> Result<()>
    where
        F: FnMut(u32, StoredCells) -> Result<()>,
    {
        for (key, value) in self.iter_prefix(keys::CELLS_PREFIX) {
            let id = keys::id_from_key(key)?;
            let cells: StoredCells = decode_cbor(value)
                .map_err(|e| FenceError::Corruption(format!("cells for feature {id}: {e}")))?;
            add(id, cells)?;
        }
        Ok(())
    }

    /// Loads the terminal info record; its absence marks an unsealed or
    /// foreign file.
    pub fn load_index_infos(&self) -> Result<IndexInfos> {
        let raw = self.get(&keys::info_key()).ok_or_else(|| {
            FenceError::Corruption("no info record, not a sealed index".to_string())
        })?;
        decode_cbor(&raw).map_err(|e| FenceError::Corruption(format!("info record: {e}")))
    }
}

/// CBOR-encodes a blob value.
pub fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out).map_err(|e| FenceError::Encode(e.to_string()))?;
    Ok(out)
}

/// Decodes a CBOR blob value.
pub fn decode_cbor<T: DeserializeOwned>(raw: &[u8]) -> std::result::Result<T, String> {
    ciborium::from_reader(raw).map_err(|e| e.to_string())
}
