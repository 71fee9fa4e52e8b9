use crate::matrix::write_row;
use crate::store::Store;
use crate::{IndexError, IndexSettings};
use color_surf::{ColorSurf, Description};
use log::*;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write `<stem>_kps.csv` and `<stem>_descs.txt` for one image into `output`.
///
/// Every keypoint line is `x, y, scale, response, angle` and the matching line
/// of the descriptor file holds its color descriptor.
pub fn write_description(
    output: &Path,
    stem: &str,
    description: &Description,
) -> Result<(PathBuf, PathBuf), IndexError> {
    let kps_path = output.join(format!("{stem}_kps.csv"));
    let descs_path = output.join(format!("{stem}_descs.txt"));
    let mut kps = BufWriter::new(File::create(&kps_path).map_err(IndexError::io(&kps_path))?);
    let mut descs =
        BufWriter::new(File::create(&descs_path).map_err(IndexError::io(&descs_path))?);
    for (kp, angle, descriptor) in description.iter() {
        writeln!(
            kps,
            "{}, {}, {}, {}, {}",
            kp.point.0, kp.point.1, kp.scale, kp.response, angle
        )
        .map_err(IndexError::io(&kps_path))?;
        write_row(&mut descs, descriptor).map_err(IndexError::io(&descs_path))?;
    }
    kps.flush().map_err(IndexError::io(&kps_path))?;
    descs.flush().map_err(IndexError::io(&descs_path))?;
    Ok((kps_path, descs_path))
}

/// Extract features of every image, write the local descriptor files and
/// register the images in `store`.
///
/// The image id is the file stem followed by `settings.image_suffix`, the same
/// id `load` derives from the descriptor file, so `image_suffix` should match
/// the extension of the images. Images that fail to load or have no features
/// are logged and skipped, as is any image whose stem was already described
/// in this run, since its files would replace the earlier ones.
/// Returns the number of images described.
pub fn extract_images(
    settings: &IndexSettings,
    images: &[PathBuf],
    output: &Path,
    store: &mut impl Store,
) -> Result<usize, IndexError> {
    let surf = ColorSurf::new(settings.extractor)?;
    std::fs::create_dir_all(output).map_err(IndexError::io(output))?;
    let mut described = 0;
    let mut stems = HashSet::new();
    for path in images {
        let (stem, id) = match (
            path.file_stem().and_then(|stem| stem.to_str()),
            settings.image_id(path),
        ) {
            (Some(stem), Some(id)) => (stem, id),
            _ => {
                error!("unable to form an image id from {}", path.display());
                continue;
            }
        };
        if stems.contains(stem) {
            error!(
                "skipped {}, an image with stem {} was already described",
                path.display(),
                stem
            );
            continue;
        }
        if path.file_name().and_then(|name| name.to_str()) != Some(id.as_str()) {
            warn!("{} is registered as {}", path.display(), id);
        }
        let description = match surf.extract_path(path) {
            Ok(description) => description,
            Err(color_surf::Error::NoFeaturesDetected) => {
                warn!("no features detected in {}", path.display());
                continue;
            }
            Err(e) => {
                error!("unable to extract features of {}: {}", path.display(), e);
                continue;
            }
        };
        write_description(output, stem, &description)?;
        stems.insert(stem.to_owned());
        if !store.register_image(&id) {
            debug!("image {} was already registered", id);
        }
        info!("described {} with {} features", id, description.len());
        described += 1;
    }
    Ok(described)
}
