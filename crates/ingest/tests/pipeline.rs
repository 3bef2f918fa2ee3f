use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::TempDir;
use wordvec_ingest::{
    ingest, IngestError, IngestMode, IngestOptions, IngestPipeline, SourceEncoding, Stage,
};
use wordvec_protocol::{ErrorKind, ModelFields, ModelRef};
use wordvec_query::ListOptions;
use wordvec_store::{open, CommitPolicy, LocalStore, ServiceConfig, StorageService};

const TWO_WORDS: &str = "2 3\nfoo 1.0 2.0 3.0\nbar 4.0 5.0 6.0\n";

fn memory() -> Box<dyn StorageService + Send> {
    open("memory://", &ServiceConfig::default()).unwrap()
}

fn values_of(service: &mut dyn StorageService, model: &str, word: &str) -> Vec<f64> {
    let found = service
        .get_vectors_for_words(
            &ModelRef::from(model),
            &[word.to_string()],
            &ListOptions::default().exact(true),
        )
        .unwrap();
    assert_eq!(found.len(), 1, "word {word}");
    found[0].values().unwrap()
}

#[test]
fn fresh_model_is_created_with_the_header_shape() {
    let mut store = memory();
    let report = ingest(
        store.as_mut(),
        &ModelRef::from("m1"),
        TWO_WORDS.as_bytes(),
        IngestMode::Merge,
    )
    .unwrap();

    assert_eq!(report.flushed, 2);
    assert_eq!(report.created, 2);
    assert_eq!(report.encoding, SourceEncoding::Plain);
    assert_eq!(report.model.params.num_words, Some(2));
    assert_eq!(report.model.params.dim, Some(3));

    let m1 = ModelRef::from("m1");
    assert_eq!(store.count_vectors_for_model(&m1).unwrap(), 2);
    assert_eq!(values_of(store.as_mut(), "m1", "foo"), vec![1.0, 2.0, 3.0]);
}

#[test]
fn reingesting_updates_in_place() {
    let mut store = memory();
    let m1 = ModelRef::from("m1");
    ingest(store.as_mut(), &m1, TWO_WORDS.as_bytes(), IngestMode::Merge).unwrap();
    let before = store.get_vectors_for_model(&m1, &ListOptions::default()).unwrap();

    let changed = "2 3\nfoo 7.0 8.0 9.0\nbar 4.0 5.0 6.0\n";
    let report = ingest(store.as_mut(), &m1, changed.as_bytes(), IngestMode::Merge).unwrap();
    assert_eq!((report.created, report.updated), (0, 2));

    assert_eq!(store.count_vectors_for_model(&m1).unwrap(), 2);
    assert_eq!(values_of(store.as_mut(), "m1", "foo"), vec![7.0, 8.0, 9.0]);
    let after = store.get_vectors_for_model(&m1, &ListOptions::default()).unwrap();
    let ids = |v: &[wordvec_protocol::Vector]| v.iter().map(|v| v.id).collect::<Vec<_>>();
    assert_eq!(ids(&before), ids(&after));
}

#[test]
fn merge_ingestion_is_idempotent() {
    let mut store = memory();
    let m = ModelRef::from("m");
    ingest(store.as_mut(), &m, TWO_WORDS.as_bytes(), IngestMode::Merge).unwrap();
    let first = store.get_vectors_for_model(&m, &ListOptions::default()).unwrap();
    ingest(store.as_mut(), &m, TWO_WORDS.as_bytes(), IngestMode::Merge).unwrap();
    let second = store.get_vectors_for_model(&m, &ListOptions::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn compressed_inputs_ingest_like_plain_text() {
    let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    gz.write_all(TWO_WORDS.as_bytes()).unwrap();
    let gz = gz.finish().unwrap();
    let mut bz = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::fast());
    bz.write_all(TWO_WORDS.as_bytes()).unwrap();
    let bz = bz.finish().unwrap();

    let mut store = memory();
    let plain = ingest(store.as_mut(), &"plain".into(), TWO_WORDS.as_bytes(), IngestMode::Merge)
        .unwrap();
    let gzip = ingest(store.as_mut(), &"gzip".into(), gz.as_slice(), IngestMode::Merge).unwrap();
    let bzip = ingest(store.as_mut(), &"bzip".into(), bz.as_slice(), IngestMode::Merge).unwrap();
    assert_eq!(gzip.encoding, SourceEncoding::Gzip);
    assert_eq!(bzip.encoding, SourceEncoding::Bzip2);

    for model in ["plain", "gzip", "bzip"] {
        assert_eq!(values_of(store.as_mut(), model, "bar"), vec![4.0, 5.0, 6.0]);
    }
    assert_eq!(plain.flushed, gzip.flushed);
    assert_eq!(plain.flushed, bzip.flushed);
}

#[test]
fn force_mode_surfaces_existing_words_as_conflicts() {
    let mut store = memory();
    let m = ModelRef::from("m");
    ingest(store.as_mut(), &m, TWO_WORDS.as_bytes(), IngestMode::Force).unwrap();
    let err = ingest(store.as_mut(), &m, TWO_WORDS.as_bytes(), IngestMode::Force).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.stage, Stage::Flush);
    assert_eq!(err.flushed, 0);
    assert_eq!(store.count_vectors_for_model(&m).unwrap(), 2);
}

#[test]
fn format_errors_abort_but_keep_flushed_batches() {
    let config = ServiceConfig::default().with_commit_policy(CommitPolicy::Manual);
    let mut store = LocalStore::in_memory(&config);
    let m = ModelRef::from("m");
    let input = "4 2\na 1 1\nb 2 2\nc 3 3\nd 4\n";
    let err = IngestPipeline::new(IngestOptions::default().with_batch_size(2))
        .run(&mut store, &m, input.as_bytes())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.flushed, 2);
    assert_eq!(err.stage, Stage::StreamRecords);
    assert!(matches!(err.cause, IngestError::Format { line: 5, .. }), "{err}");
    // "c" was read but never flushed; the rollback dropped nothing committed.
    assert_eq!(store.get_words(&m, None, false).unwrap(), vec!["a", "b"]);
}

#[test]
fn progress_is_reported_after_every_flush() {
    let mut store = memory();
    let input = "5 1\na 1\nb 2\nc 3\nd 4\ne 5\n";
    let mut seen = Vec::new();
    let mut observer = |flushed: u64, expected: u64| seen.push((flushed, expected));
    IngestPipeline::new(IngestOptions::default().with_batch_size(2))
        .with_observer(&mut observer)
        .run(store.as_mut(), &"m".into(), input.as_bytes())
        .unwrap();
    assert_eq!(seen, vec![(2, 5), (4, 5), (5, 5)]);
}

#[test]
fn duplicate_words_in_one_batch_keep_the_last_values() {
    let mut store = memory();
    let input = "3 1\nw 1\nx 2\nw 3\n";
    let report = ingest(store.as_mut(), &"m".into(), input.as_bytes(), IngestMode::Merge).unwrap();
    assert_eq!(report.flushed, 2);
    assert_eq!(values_of(store.as_mut(), "m", "w"), vec![3.0]);
}

#[test]
fn shape_changes_update_the_model() {
    let mut store = memory();
    let mut fields = ModelFields::named("m").with_shape(100, 300);
    fields.description = Some("kept".to_string());
    store.create_model(&fields).unwrap();

    let report = ingest(store.as_mut(), &"m".into(), TWO_WORDS.as_bytes(), IngestMode::Merge)
        .unwrap();
    assert_eq!(report.model.params.num_words, Some(2));
    assert_eq!(report.model.params.dim, Some(3));
    assert_eq!(report.model.description.as_deref(), Some("kept"));
}

#[test]
fn malformed_files_leave_models_untouched() {
    let mut store = memory();
    let m = ModelRef::from("m");
    ingest(store.as_mut(), &m, TWO_WORDS.as_bytes(), IngestMode::Merge).unwrap();

    let err = ingest(store.as_mut(), &m, "9 7\nbad 1 2\n".as_bytes(), IngestMode::Merge)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.flushed, 0);
    let kept = store.get_model(&m).unwrap().unwrap();
    assert_eq!(kept.params.num_words, Some(2));
    assert_eq!(kept.params.dim, Some(3));
    assert_eq!(store.count_vectors_for_model(&m).unwrap(), 2);

    let fresh = ModelRef::from("fresh");
    let err = ingest(store.as_mut(), &fresh, "1 3\nx 1\n".as_bytes(), IngestMode::Merge)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert!(!store.model_exists(&fresh).unwrap());
}

#[test]
fn empty_inputs_still_create_the_model() {
    let mut store = memory();
    let report = ingest(store.as_mut(), &"empty".into(), "0 4\n".as_bytes(), IngestMode::Merge)
        .unwrap();
    assert_eq!(report.flushed, 0);
    assert_eq!(report.model.params.dim, Some(4));
    assert!(store.model_exists(&"empty".into()).unwrap());
}

#[test]
fn absent_reference_takes_the_file_stem() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("glove-small.vec");
    std::fs::write(&path, TWO_WORDS).unwrap();

    let mut store = memory();
    let report = IngestPipeline::new(IngestOptions::default())
        .run_path(store.as_mut(), &ModelRef::Absent, &path)
        .unwrap();
    assert_eq!(report.model.name, "glove-small");

    let err = ingest(store.as_mut(), &ModelRef::Absent, TWO_WORDS.as_bytes(), IngestMode::Merge)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert!(matches!(err.cause, IngestError::MissingModelName));

    let err = ingest(store.as_mut(), &ModelRef::Id(99), TWO_WORDS.as_bytes(), IngestMode::Merge)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
