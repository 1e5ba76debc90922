use std::fs::{self, OpenOptions};
use std::io::{Cursor, Write};

use vpdedup::{
    BackendConfig, ConfigLoadError, Fingerprint, FingerprintError, IndexConfig, IndexError,
    LinearStoreConfig, MatchEngine, MatchError, MatchMode, StoreError, VpTree, VpdedupConfig,
    VpdedupError, import_lines, open_store,
};

fn word(v: u64) -> Fingerprint {
    Fingerprint::from_words("phash64", 64, &[v]).unwrap()
}

#[test]
fn incomparable_fingerprints_fail_distance() {
    let a = word(1);
    let b = Fingerprint::from_words("dhash64", 64, &[1]).unwrap();
    assert!(matches!(a.distance(&b), Err(FingerprintError::Comparability { .. })));

    let engine = MatchEngine::with_defaults();
    assert!(matches!(
        engine.compare(&a, &b, MatchMode::Sloppy),
        Err(MatchError::Fingerprint(FingerprintError::Comparability { .. }))
    ));
}

#[test]
fn incomparable_pair_does_not_abort_bulk_match() {
    let items = vec![word(0), Fingerprint::from_words("dhash64", 64, &[0]).unwrap(), word(1)];
    let (records, stats) = MatchEngine::with_defaults().find_matches_with_stats(&items, MatchMode::Strict);
    assert_eq!(records.len(), 1);
    assert_eq!(stats.incomparable, 2);
    assert_eq!(stats.matched, 1);
}

#[test]
fn tree_argument_errors() {
    assert!(matches!(
        VpTree::build(Vec::new(), IndexConfig::default()),
        Err(IndexError::InvalidArgument(_))
    ));
    assert!(matches!(
        VpTree::build(
            vec![word(1), Fingerprint::from_words("ahash64", 64, &[1]).unwrap()],
            IndexConfig::default()
        ),
        Err(IndexError::Fingerprint(FingerprintError::Comparability { .. }))
    ));

    let tree = VpTree::build(vec![word(1), word(2)], IndexConfig::default()).unwrap();
    assert!(matches!(tree.k_nearest(&word(1), 0), Err(IndexError::InvalidArgument(_))));
    assert!(matches!(tree.within(&word(1), f64::NAN), Err(IndexError::InvalidArgument(_))));
    assert!(matches!(
        IndexConfig::default().with_parallel_threshold(0).validate(),
        Err(IndexError::InvalidArgument(_))
    ));
}

#[test]
fn store_rejects_mismatched_shapes_and_unknown_algorithms() {
    let store = open_store(&VpdedupConfig::default()).unwrap();
    store.store(word(1)).unwrap();

    let other = Fingerprint::from_words("ahash64", 64, &[1]).unwrap();
    assert!(matches!(
        store.store(other.clone()),
        Err(StoreError::Index(IndexError::Fingerprint(FingerprintError::Comparability { .. })))
            | Err(StoreError::Fingerprint(FingerprintError::Comparability { .. }))
    ));
    assert!(store.k_nearest(&other, 1).is_err());

    let unknown = Fingerprint::from_words("whash64", 64, &[1]).unwrap();
    assert!(matches!(
        store.store(unknown),
        Err(StoreError::Fingerprint(FingerprintError::UnknownAlgorithm(_)))
    ));
    assert_eq!(store.len().unwrap(), 1);
}

#[test]
fn corrupt_log_lenient_vs_strict() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hashes.log");
    let mut file = OpenOptions::new().create(true).append(true).open(&path).unwrap();
    writeln!(file, "{}", word(1).to_line()).unwrap();
    writeln!(file, "ffff,phash64,64").unwrap();
    writeln!(file, "{}", word(2).to_line()).unwrap();
    drop(file);

    let lenient = BackendConfig::Linear(LinearStoreConfig::new(&path))
        .build(MatchEngine::with_defaults())
        .unwrap();
    assert_eq!(lenient.len().unwrap(), 2);
    assert_eq!(lenient.to_list().unwrap(), vec![word(1), word(2)]);

    let strict = BackendConfig::Linear(LinearStoreConfig::new(&path).with_strict(true))
        .build(MatchEngine::with_defaults());
    assert!(matches!(strict, Err(StoreError::Corrupt { line: 2, .. })));
}

#[test]
fn log_removed_underneath_store_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hashes.log");
    let store = BackendConfig::linear(&path)
        .build(MatchEngine::with_defaults())
        .unwrap();
    store.store(word(1)).unwrap();

    fs::remove_file(&path).unwrap();
    assert!(matches!(store.to_list(), Err(StoreError::Io(_))));
    assert!(matches!(store.k_nearest(&word(1), 1), Err(StoreError::Io(_))));
}

#[test]
fn config_errors_surface_through_open_store() {
    let err = VpdedupConfig::from_yaml("version: [").unwrap_err();
    assert!(matches!(err, ConfigLoadError::YamlParse(_)));

    let mut config = VpdedupConfig::default();
    config.store.backend = "linear".to_string();
    assert!(matches!(
        open_store(&config),
        Err(VpdedupError::Config(ConfigLoadError::MissingField(_)))
    ));

    config.store.path = Some(tempfile::tempdir().unwrap().path().join("gone").join("x.log"));
    assert!(matches!(open_store(&config), Err(VpdedupError::Store(StoreError::Io(_)))));
}

#[test]
fn import_stops_at_first_malformed_line() {
    let store = open_store(&VpdedupConfig::default()).unwrap();
    let text = format!("{}\n{},\\q\n", word(1).to_line(), word(2).to_line());
    assert!(matches!(
        import_lines(store.as_ref(), Cursor::new(text)),
        Err(VpdedupError::Store(StoreError::Corrupt { line: 2, .. }))
    ));
    assert!(store.is_empty().unwrap());
}
