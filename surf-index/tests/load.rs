use std::fs;
use std::path::Path;
use surf_index::{load, IndexSettings, Store, Tables};

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

struct Fixture {
    _dir: tempfile::TempDir,
    settings: IndexSettings,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let descriptors = dir.path().join("vlad");
    fs::create_dir(&descriptors).unwrap();
    write(&descriptors, "a.txt", "0.5 0.25 1\n");
    write(&descriptors, "b.txt", "1,2,\n3\n");
    // Not registered in the store.
    write(&descriptors, "c.txt", "4 5 6\n");
    write(&descriptors, "broken.txt", "1 2 three\n");
    write(&descriptors, "ignored.csv", "7 8 9\n");
    let vocabularies = vec![
        write(dir.path(), "vocab1.txt", "1 2\n3 4\n5 6\n"),
        write(dir.path(), "vocab2.txt", "1 2\n3\n"),
        write(dir.path(), "vocab3.txt", "9 8 7\n"),
    ];
    let projection = write(dir.path(), "pca.txt", "0.1 0.2 0.3\n1 0 0\n0 1 0\n");
    let settings = IndexSettings {
        store: dir.path().join("index.store"),
        descriptors,
        vocabularies,
        projection: Some(projection),
        whitening: true,
        ..Default::default()
    };
    Fixture {
        _dir: dir,
        settings,
    }
}

fn registered(ids: &[&str]) -> Tables {
    let mut tables = Tables::default();
    for id in ids {
        tables.register_image(id);
    }
    tables
}

#[test]
fn loads_descriptors_codebooks_and_reducer() {
    let _ = pretty_env_logger::try_init_timed();
    let Fixture { _dir, settings } = fixture();
    let mut store = registered(&["a.jpg", "b.jpg", "broken.jpg"]);
    let report = load(&settings, &mut store).unwrap();

    assert_eq!(report.descriptor_files, 4);
    assert_eq!(report.descriptors_indexed, 2);
    assert_eq!(report.vocabularies, 3);
    // The ragged codebook is skipped.
    assert_eq!(report.vocabularies_indexed, 2);
    assert_eq!(report.projections_indexed, 1);

    let images = store.images();
    assert_eq!(images["a.jpg"].descriptor, Some(vec![0.5, 0.25, 1.0]));
    assert_eq!(images["b.jpg"].descriptor, Some(vec![1.0, 2.0, 3.0]));
    assert_eq!(images["broken.jpg"].descriptor, None);
    assert!(!images.contains_key("c.jpg"));

    let codebooks = store.codebooks();
    assert_eq!(codebooks.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(codebooks[&1].len(), 3);

    let reducer = &store.reducers()[&1];
    assert_eq!(reducer.mean, vec![0.1, 0.2, 0.3]);
    assert_eq!(reducer.subspace, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
    assert!(reducer.whiten);
}

#[test]
fn rerunning_replaces_codebooks_and_reducers() {
    let Fixture { _dir, mut settings } = fixture();
    let mut store = registered(&["a.jpg"]);
    load(&settings, &mut store).unwrap();
    settings.vocabularies.truncate(1);
    settings.whitening = false;
    let report = load(&settings, &mut store).unwrap();
    assert_eq!(report.vocabularies_indexed, 1);
    assert_eq!(store.codebooks().len(), 1);
    assert_eq!(store.reducers().len(), 1);
    assert!(!store.reducers()[&1].whiten);
}

#[test]
fn missing_projection_aborts_but_missing_codebook_does_not() {
    let Fixture { _dir, mut settings } = fixture();
    settings.vocabularies.push(settings.descriptors.join("absent.txt"));
    let mut store = Tables::default();
    let report = load(&settings, &mut store).unwrap();
    assert_eq!(report.vocabularies_indexed, 2);

    settings.projection = Some(settings.descriptors.join("absent.txt"));
    assert!(load(&settings, &mut store).is_err());
}

#[test]
fn store_round_trips_through_its_file() {
    let Fixture { _dir, settings } = fixture();
    let mut store = registered(&["a.jpg", "b.jpg"]);
    load(&settings, &mut store).unwrap();
    store.save(&settings.store).unwrap();
    assert_eq!(Tables::open(&settings.store).unwrap(), store);
}
