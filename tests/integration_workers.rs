//! Integration tests for process-isolated extraction.
//!
//! These spawn the real `nolossia worker` binary built for this test run.

mod common;

use common::*;
use nolossia::core::config::{ExecutorConfig, ExtractConfig, WorkerStrategy};
use nolossia::core::executor::{CancellationToken, Executor};
use nolossia::core::extractor::{ExtractOutcome, Extractor};
use nolossia::core::fs::LocalFileSystem;
use nolossia::core::hasher::ImageDownsampler;
use nolossia::core::manifest::InMemoryManifest;
use nolossia::core::metadata::ExifMetadataReader;
use nolossia::core::record::ImageFormat;
use nolossia::core::scanner::DiscoveredFile;
use nolossia::core::session::MergeSession;
use nolossia::events::null_sender;
use std::path::PathBuf;
use tempfile::TempDir;

fn worker_program() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_nolossia"))
}

#[test]
fn process_workers_return_records_in_input_order() {
    let temp_dir = TempDir::new().unwrap();
    let files: Vec<DiscoveredFile> = (0..10)
        .map(|i| {
            let path = temp_dir.path().join(format!("{:02}.jpg", i));
            std::fs::write(&path, format!("frame {}", i)).unwrap();
            DiscoveredFile {
                path,
                format: ImageFormat::Jpeg,
            }
        })
        .collect();
    let config = ExecutorConfig {
        strategy: WorkerStrategy::Processes,
        workers: Some(3),
        worker_program: Some(worker_program()),
        ..Default::default()
    };
    let extract = ExtractConfig::default();
    let extractor = Extractor::new(&LocalFileSystem, &ExifMetadataReader, &ImageDownsampler, &extract);

    let report = Executor::new(&config, CancellationToken::new(), null_sender()).run(&files, &extractor);

    assert_eq!(report.strategy, WorkerStrategy::Processes);
    assert!(!report.cancelled);
    assert_eq!(report.outcomes.len(), 10);
    for (i, outcome) in report.outcomes.iter().enumerate() {
        let ExtractOutcome::Record(record) = outcome else {
            panic!("slot {} is not a record: {:?}", i, outcome);
        };
        assert_eq!(record.scan_index, i);
        assert_eq!(record.path, files[i].path);
        assert_eq!(record.content_hash, hash_of(&files[i].path));
    }
}

#[test]
fn session_scan_through_process_workers() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("card");
    let gradient = image::RgbImage::from_fn(48, 32, |x, y| image::Rgb([(x * 5) as u8, (y * 7) as u8, 40]));
    std::fs::create_dir_all(&input).unwrap();
    gradient.save(input.join("a.png")).unwrap();
    std::fs::copy(input.join("a.png"), input.join("b.png")).unwrap();
    std::fs::write(input.join("c.jpg"), "not really a jpeg").unwrap();

    let fs = LocalFileSystem;
    let manifest = InMemoryManifest::new();
    let mut session = MergeSession::new(
        config()
            .with_strategy(WorkerStrategy::Processes)
            .with_worker_program(worker_program()),
        &fs,
        &manifest,
    );

    let scanned = session.scan(&[input.clone()]).unwrap();

    let names: Vec<_> = scanned
        .records
        .iter()
        .map(|r| r.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.png", "b.png", "c.jpg"]);
    assert!(scanned.records[0].perceptual_hash.is_some());
    assert!(scanned.records[2].perceptual_hash.is_none());
    assert_eq!(session.dedupe().unwrap().summary.exact_duplicates, 1);
}
