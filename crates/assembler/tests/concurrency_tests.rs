// Per-session serialization and at-most-once finalize under concurrency

mod common;

use common::*;
use futures::future::join_all;
use hopper_assembler::{OpenSession, UploadError};
use hopper_core::UploadState;
use hopper_core::config::PolicyConfig;

fn wide_policy() -> PolicyConfig {
    PolicyConfig {
        max_size: 1024 * 1024,
        ..png_only_policy()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_to_one_session() {
    let t = TestAssembler::new(wide_policy()).await;
    let png = png_bytes(64, 64);
    let chunk = 16usize;
    let n = png.len().div_ceil(chunk) as u32;

    t.assembler
        .open_session(OpenSession {
            session_id: sid("parallel"),
            declared_name: "photo.png".to_string(),
            total_size: png.len() as u64,
            chunk_size: Some(chunk as u64),
            client_addr: None,
        })
        .await
        .unwrap();

    // Every chunk twice, all at once
    let tasks = (0..n).chain(0..n).map(|index| {
        let assembler = t.assembler.clone();
        let png = png.clone();
        tokio::spawn(async move {
            append(&assembler, "parallel", "photo.png", &png, chunk, index).await
        })
    });
    let receipts: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let duplicates = receipts.iter().filter(|r| r.duplicate).count();
    assert_eq!(duplicates, n as usize, "each index written exactly once");

    let snapshot = t.assembler.session(&sid("parallel")).await.unwrap();
    assert_eq!(snapshot.bytes_written, png.len() as u64);
    assert!(snapshot.missing.is_empty());

    let done = t.assembler.finalize(&sid("parallel"), None).await.unwrap();
    assert_eq!(done.dimensions, Some((64, 64)));
    assert_eq!(
        std::fs::read(t.permanent_dir().join(done.permanent_name)).unwrap(),
        png
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_finalize_runs_once() {
    let t = TestAssembler::new(png_only_policy()).await;
    let png = png_bytes(10, 10);
    append(&t.assembler, "race", "photo.png", &png, png.len(), 0)
        .await
        .unwrap();

    let tasks = (0..8).map(|_| {
        let assembler = t.assembler.clone();
        tokio::spawn(async move { assembler.finalize(&sid("race"), None).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let first = &results[0];
    assert!(results.iter().all(|r| r == first));
    assert_eq!(t.store.reads(), 1, "validation pipeline ran once");
    assert_eq!(t.store.promotes(), 1);
    assert_eq!(t.files_in(t.permanent_dir()), vec![first.permanent_name.clone()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rejection_reported_to_every_caller() {
    let t = TestAssembler::new(png_only_policy()).await;
    append(&t.assembler, "reject", "photo.png", PDF_BYTES, PDF_BYTES.len(), 0)
        .await
        .unwrap();

    let tasks = (0..4).map(|_| {
        let assembler = t.assembler.clone();
        tokio::spawn(async move { assembler.finalize(&sid("reject"), None).await })
    });
    for result in join_all(tasks).await {
        let err = result.unwrap().unwrap_err();
        assert!(matches!(err, UploadError::DisallowedMimeType { .. }));
    }
    assert_eq!(t.store.reads(), 1);
    assert_eq!(
        t.assembler.session(&sid("reject")).await.unwrap().state,
        UploadState::Rejected
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_sessions_progress_in_parallel() {
    let t = TestAssembler::new(wide_policy()).await;
    let png = png_bytes(20, 20);
    let chunk = png.len().div_ceil(4);

    let tasks = (0..16).map(|i| {
        let assembler = t.assembler.clone();
        let png = png.clone();
        tokio::spawn(async move {
            let session = format!("s{i}");
            // Index 0 opens; the rest follow in reverse
            for index in [0, 3, 2, 1] {
                append(&assembler, &session, "photo.png", &png, chunk, index).await?;
            }
            assembler.finalize(&sid(&session), None).await
        })
    });

    let mut names = std::collections::HashSet::new();
    for result in join_all(tasks).await {
        names.insert(result.unwrap().unwrap().permanent_name);
    }
    assert_eq!(names.len(), 16, "permanent names are unique");
    assert_eq!(t.files_in(t.permanent_dir()).len(), 16);
}
