use crate::IndexError;
use color_surf::Config;
use log::*;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// The settings of the indexer, read from a JSON file.
///
/// Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSettings {
    /// The file where the store tables are persisted
    #[serde(default = "default_store")]
    pub store: PathBuf,
    /// The directory holding one aggregated descriptor file per image
    #[serde(default = "default_descriptors")]
    pub descriptors: PathBuf,
    /// Extension of the descriptor files, without the dot
    #[serde(default = "default_descriptor_extension")]
    pub descriptor_extension: String,
    /// Appended to the stem of a descriptor file to form the image id
    #[serde(default = "default_image_suffix")]
    pub image_suffix: String,
    /// Vocabulary codebook files, loaded with ids 1, 2, ... in this order
    #[serde(default)]
    pub vocabularies: Vec<PathBuf>,
    /// The projection file: the mean vector followed by the subspace basis
    #[serde(default)]
    pub projection: Option<PathBuf>,
    /// Whether projected vectors are whitened
    #[serde(default)]
    pub whitening: bool,
    /// Parameters of the feature extractor
    #[serde(default)]
    pub extractor: Config,
}

fn default_store() -> PathBuf {
    "index.store".into()
}

fn default_descriptors() -> PathBuf {
    "descriptors".into()
}

fn default_descriptor_extension() -> String {
    "txt".into()
}

fn default_image_suffix() -> String {
    ".jpg".into()
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            store: default_store(),
            descriptors: default_descriptors(),
            descriptor_extension: default_descriptor_extension(),
            image_suffix: default_image_suffix(),
            vocabularies: vec![],
            projection: None,
            whitening: false,
            extractor: Config::default(),
        }
    }
}

impl IndexSettings {
    /// Read the settings at `path`, or use the defaults if there is no such file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("used default settings");
                return Ok(Self::default());
            }
            Err(e) => return Err(IndexError::io(path)(e)),
        };
        let settings = serde_json::from_reader(std::io::BufReader::new(file)).map_err(|source| {
            IndexError::Settings {
                path: path.to_owned(),
                source,
            }
        })?;
        info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    /// The id of the image described by a descriptor file.
    pub fn image_id(&self, path: &Path) -> Option<String> {
        let stem = path.file_stem()?.to_str()?;
        Some(format!("{}{}", stem, self.image_suffix))
    }

    /// Log the settings of a run.
    pub fn log(&self) {
        info!("Store: {}", self.store.display());
        info!("Descriptors: {}", self.descriptors.display());
        info!("Type: {}", self.descriptor_extension);
        for (i, vocabulary) in self.vocabularies.iter().enumerate() {
            info!("Vocabulary #{}: {}", i + 1, vocabulary.display());
        }
        match &self.projection {
            Some(projection) => info!("Projection: {}", projection.display()),
            None => info!("Projection: none"),
        }
        info!("Whitening: {}", self.whitening);
    }
}
