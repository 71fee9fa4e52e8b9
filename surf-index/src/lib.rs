//! Extraction of Color SURF descriptors and loading of image descriptors,
//! vocabulary codebooks and projection reducers into an index store.

mod error;
mod extract;
mod indexer;
pub mod matrix;
mod settings;
mod store;

pub use error::IndexError;
pub use extract::{extract_images, write_description};
pub use indexer::{load, IndexReport};
pub use settings::IndexSettings;
pub use store::{ImageRow, Reducer, Store, Tables};
