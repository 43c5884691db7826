// Concurrent staging writes and promotion races against the filesystem backend

mod common;

use bytes::Bytes;
use common::seeded_bytes;
use hopper_storage::{ArtifactStore, FilesystemBackend, StorageError};
use std::sync::Arc;
use tempfile::TempDir;

async fn backend(temp_dir: &TempDir) -> Arc<FilesystemBackend> {
    Arc::new(
        FilesystemBackend::new(
            temp_dir.path().join("staging"),
            temp_dir.path().join("uploads"),
        )
        .await
        .unwrap(),
    )
}

#[tokio::test]
async fn test_concurrent_offset_writes_assemble_in_place() {
    let temp_dir = TempDir::new().unwrap();
    let backend = backend(&temp_dir).await;

    const CHUNK: usize = 4096;
    const CHUNKS: usize = 16;
    let data = seeded_bytes(7, CHUNK * CHUNKS);

    // Write every chunk from its own task, in reverse order
    let mut handles = Vec::new();
    for i in (0..CHUNKS).rev() {
        let backend = backend.clone();
        let piece = data.slice(i * CHUNK..(i + 1) * CHUNK);
        handles.push(tokio::spawn(async move {
            backend
                .write_staged("session-a", (i * CHUNK) as u64, piece)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(
        backend.staged_size("session-a").await.unwrap(),
        (CHUNK * CHUNKS) as u64
    );
    assert_eq!(backend.read_staged("session-a").await.unwrap(), data);
}

#[tokio::test]
async fn test_concurrent_promote_same_name_single_winner() {
    let temp_dir = TempDir::new().unwrap();
    let backend = backend(&temp_dir).await;

    for i in 0..8u64 {
        backend
            .write_staged(&format!("s{i}"), 0, seeded_bytes(i, 64))
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..8u64 {
        let backend = backend.clone();
        handles.push(tokio::spawn(async move {
            backend.promote(&format!("s{i}"), "contended.png").await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => winners += 1,
            Err(StorageError::AlreadyExists(name)) => assert_eq!(name, "contended.png"),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners, 1, "exactly one promotion may claim a name");

    // Seven losers keep their staging artifacts for a retry under a new name
    assert_eq!(backend.list_staged().await.unwrap().len(), 7);
}

#[tokio::test]
async fn test_staging_and_permanent_are_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let backend = backend(&temp_dir).await;

    backend
        .write_staged("same-key", 0, Bytes::from_static(b"staged"))
        .await
        .unwrap();

    assert!(!backend.permanent_exists("same-key").await.unwrap());
    assert!(matches!(
        backend.read_permanent("same-key").await,
        Err(StorageError::NotFound(_))
    ));
}
