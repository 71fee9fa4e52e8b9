use crate::IndexError;
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::Path;

/// A row of the `images` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRow {
    /// The aggregated descriptor, once loaded.
    pub descriptor: Option<Vec<f64>>,
}

/// A row of the `reducers` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reducer {
    /// Basis vectors of the projection subspace, one per row.
    pub subspace: Vec<Vec<f64>>,
    /// The mean subtracted before projecting.
    pub mean: Vec<f64>,
    pub whiten: bool,
}

/// The tables the indexer writes to.
///
/// Updates report the number of affected rows, so that callers can tell
/// apart descriptors of images that were never registered.
pub trait Store {
    /// Add an image row without descriptor. Returns false if it already exists.
    fn register_image(&mut self, id: &str) -> bool;

    /// Set the descriptor of an existing image.
    fn update_descriptor(&mut self, id: &str, descriptor: Vec<f64>) -> usize;

    fn truncate_codebooks(&mut self);

    fn insert_codebook(&mut self, id: u32, centroids: Vec<Vec<f64>>) -> Result<usize, IndexError>;

    fn truncate_reducers(&mut self);

    fn insert_reducer(&mut self, id: u32, reducer: Reducer) -> Result<usize, IndexError>;
}

/// In-memory tables, persisted to a single file with `bincode`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    images: BTreeMap<String, ImageRow>,
    codebooks: BTreeMap<u32, Vec<Vec<f64>>>,
    reducers: BTreeMap<u32, Reducer>,
}

impl Tables {
    /// Load the tables stored at `path`, or start empty if there is no such file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("used empty store");
                return Ok(Self::default());
            }
            Err(e) => return Err(IndexError::io(path)(e)),
        };
        let tables: Self =
            bincode::deserialize_from(BufReader::new(file)).map_err(|source| IndexError::Store {
                path: path.to_owned(),
                source,
            })?;
        info!(
            "loaded existing store with {} images, {} codebooks and {} reducers",
            tables.images.len(),
            tables.codebooks.len(),
            tables.reducers.len()
        );
        Ok(tables)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        let path = path.as_ref();
        let file = std::fs::File::create(path).map_err(IndexError::io(path))?;
        bincode::serialize_into(BufWriter::new(file), self).map_err(|source| IndexError::Store {
            path: path.to_owned(),
            source,
        })
    }

    pub fn images(&self) -> &BTreeMap<String, ImageRow> {
        &self.images
    }

    pub fn codebooks(&self) -> &BTreeMap<u32, Vec<Vec<f64>>> {
        &self.codebooks
    }

    pub fn reducers(&self) -> &BTreeMap<u32, Reducer> {
        &self.reducers
    }
}

impl Store for Tables {
    fn register_image(&mut self, id: &str) -> bool {
        if self.images.contains_key(id) {
            return false;
        }
        self.images.insert(id.to_owned(), ImageRow::default());
        true
    }

    fn update_descriptor(&mut self, id: &str, descriptor: Vec<f64>) -> usize {
        match self.images.get_mut(id) {
            Some(row) => {
                row.descriptor = Some(descriptor);
                1
            }
            None => 0,
        }
    }

    fn truncate_codebooks(&mut self) {
        self.codebooks.clear();
    }

    fn insert_codebook(&mut self, id: u32, centroids: Vec<Vec<f64>>) -> Result<usize, IndexError> {
        if self.codebooks.contains_key(&id) {
            return Err(IndexError::DuplicateKey {
                table: "codebooks",
                key: id.to_string(),
            });
        }
        self.codebooks.insert(id, centroids);
        Ok(1)
    }

    fn truncate_reducers(&mut self) {
        self.reducers.clear();
    }

    fn insert_reducer(&mut self, id: u32, reducer: Reducer) -> Result<usize, IndexError> {
        if self.reducers.contains_key(&id) {
            return Err(IndexError::DuplicateKey {
                table: "reducers",
                key: id.to_string(),
            });
        }
        self.reducers.insert(id, reducer);
        Ok(1)
    }
}
