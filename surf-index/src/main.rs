use log::*;
use std::path::PathBuf;
use structopt::StructOpt;
use surf_index::{IndexError, IndexSettings, Tables};

#[derive(StructOpt, Clone)]
#[structopt(
    name = "surf-index",
    about = "Extracts Color SURF descriptors and loads image descriptors into an index store"
)]
struct Opt {
    /// The file where settings are specified.
    ///
    /// This is in the format of `surf_index::IndexSettings`. Defaults are used
    /// if the file does not exist.
    #[structopt(short, long, default_value = "surf-index.json")]
    settings: PathBuf,
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Clone)]
enum Command {
    /// Extract features of images into local descriptor files and register the images
    Extract {
        /// Directory where the `_kps.csv` and `_descs.txt` files are written
        #[structopt(short, long, default_value = ".", parse(from_os_str))]
        output: PathBuf,
        /// List of image files
        #[structopt(parse(from_os_str))]
        images: Vec<PathBuf>,
    },
    /// Load the aggregated descriptors, the vocabularies and the projection into the store
    Load,
}

fn run(opt: Opt) -> Result<(), IndexError> {
    let settings = IndexSettings::load(&opt.settings)?;
    settings.log();
    let mut store = Tables::open(&settings.store)?;
    match opt.command {
        Command::Extract { output, images } => {
            let described = surf_index::extract_images(&settings, &images, &output, &mut store)?;
            info!("described {} of {} images", described, images.len());
        }
        Command::Load => {
            surf_index::load(&settings, &mut store)?;
        }
    }
    info!("saving the store");
    store.save(&settings.store)
}

fn main() {
    pretty_env_logger::init_timed();
    let opt = Opt::from_args();
    if let Err(e) = run(opt) {
        error!("{}", e);
        std::process::exit(1);
    }
}
