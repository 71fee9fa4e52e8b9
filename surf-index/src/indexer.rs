use crate::matrix::{read_matrix, read_vector};
use crate::store::{Reducer, Store};
use crate::{IndexError, IndexSettings};
use log::*;
use std::path::PathBuf;

/// How much of each table a [`load`] run filled in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub descriptor_files: usize,
    /// Descriptors stored on a registered image.
    pub descriptors_indexed: usize,
    pub vocabularies: usize,
    pub vocabularies_indexed: usize,
    pub projections: usize,
    pub projections_indexed: usize,
}

/// The descriptor files in the descriptor directory, sorted by name.
fn descriptor_files(settings: &IndexSettings) -> Result<Vec<PathBuf>, IndexError> {
    let extension = settings.descriptor_extension.trim_start_matches('.');
    let entries =
        std::fs::read_dir(&settings.descriptors).map_err(IndexError::io(&settings.descriptors))?;
    let mut files = vec![];
    for entry in entries {
        let path = entry.map_err(IndexError::io(&settings.descriptors))?.path();
        if path.is_file() && path.extension().map_or(false, |e| e == extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load the image descriptors, the vocabulary codebooks and the projection
/// reducer named in `settings` into `store`.
///
/// A descriptor file or codebook that cannot be read is logged and skipped.
/// The codebook and reducer tables are emptied first, so rerunning replaces
/// them. Failing to list the descriptors or to read the projection aborts.
pub fn load(settings: &IndexSettings, store: &mut impl Store) -> Result<IndexReport, IndexError> {
    let mut report = IndexReport::default();
    let files = descriptor_files(settings)?;
    report.descriptor_files = files.len();
    info!("Process started");

    for (i, path) in files.iter().enumerate() {
        let id = match settings.image_id(path) {
            Some(id) => id,
            None => {
                error!("unable to form an image id from {}", path.display());
                continue;
            }
        };
        match read_vector(path) {
            Ok(descriptor) => {
                let rows = store.update_descriptor(&id, descriptor);
                if rows == 0 {
                    warn!("no image {} for descriptor {}", id, path.display());
                }
                report.descriptors_indexed += rows;
            }
            Err(e) => error!("An error occurred indexing descriptor {}: {}", path.display(), e),
        }
        if i % 100 == 0 {
            info!("{}%...", i * 100 / files.len());
        }
    }

    store.truncate_codebooks();
    report.vocabularies = settings.vocabularies.len();
    for (i, path) in settings.vocabularies.iter().enumerate() {
        let indexed = read_matrix(path)
            .and_then(|centroids| store.insert_codebook(i as u32 + 1, centroids));
        match indexed {
            Ok(rows) => report.vocabularies_indexed += rows,
            Err(e) => error!(
                "An error occurred indexing vocabulary codebook {}: {}",
                path.display(),
                e
            ),
        }
    }

    store.truncate_reducers();
    match &settings.projection {
        Some(path) => {
            report.projections = 1;
            let mut matrix = read_matrix(path)?;
            let subspace = matrix.split_off(1);
            let mean = matrix.remove(0);
            debug!(
                "Projection of {} dimensions onto {} components",
                mean.len(),
                subspace.len()
            );
            let reducer = Reducer {
                subspace,
                mean,
                whiten: settings.whitening,
            };
            match store.insert_reducer(1, reducer) {
                Ok(rows) => report.projections_indexed += rows,
                Err(e) => error!(
                    "An error occurred indexing projection reducer {}: {}",
                    path.display(),
                    e
                ),
            }
        }
        None => warn!("no projection configured, the reducers table is left empty"),
    }

    info!("100%");
    info!("Process completed successfully");
    info!(
        "Descriptors: {} [{}]",
        report.descriptor_files, report.descriptors_indexed
    );
    info!(
        "Vocabs: {} [{}]",
        report.vocabularies, report.vocabularies_indexed
    );
    info!(
        "Projections: {} [{}]",
        report.projections, report.projections_indexed
    );
    Ok(report)
}
