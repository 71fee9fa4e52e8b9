use std::path::Path;

use color_surf::ColorSurf;
use surf_index::write_description;

fn main() {
    pretty_env_logger::init_timed();
    let args: Vec<_> = std::env::args().collect();
    for path in &args[1..] {
        let path = Path::new(path);
        let description = ColorSurf::default().extract_path(path).unwrap();
        let stem = path.file_stem().unwrap().to_str().unwrap();
        let output = path.parent().unwrap_or_else(|| Path::new("."));
        write_description(output, stem, &description).unwrap();
    }
}
