//! Serialized background flush worker.
//!
//! The recorder publishes its newest complete-document snapshot into a shared
//! slot and nudges a single worker task. Consecutive flushes coalesce: the
//! worker always writes the latest published snapshot, and shutdown drains
//! the slot before returning, so the most recent document is never lost.

use super::TrajectoryData;
use crate::core::{AgentError, AgentResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub(super) struct TrajectoryWriter {
    latest: Arc<Mutex<Option<TrajectoryData>>>,
    tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl TrajectoryWriter {
    /// Spawn the worker task. Requires a running tokio runtime.
    pub(super) fn spawn(path: PathBuf) -> Self {
        let latest = Arc::new(Mutex::new(None::<TrajectoryData>));
        let slot = Arc::clone(&latest);
        let (tx, mut rx) = mpsc::channel::<()>(1);
        let handle = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                write_latest(&path, &slot).await;
            }
            // Queue closed: whatever was published last still gets written
            write_latest(&path, &slot).await;
        });

        Self { latest, tx, handle }
    }

    /// Publish a snapshot without blocking the recording path. A newer
    /// snapshot replaces an unwritten older one; data is never dropped.
    pub(super) fn enqueue(&self, snapshot: TrajectoryData) {
        *self.latest.lock().unwrap() = Some(snapshot);
        match self.tx.try_send(()) {
            // Full means a wakeup is already pending and the worker will
            // pick up the snapshot just published.
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                log::warn!("Trajectory flush worker stopped, snapshot dropped");
            }
        }
    }

    /// Close the queue and wait until the newest snapshot is written
    pub(super) async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            log::warn!("Trajectory flush worker failed: {}", e);
        }
    }
}

/// Take the published snapshot, if any, and write it off the async executor
async fn write_latest(path: &Path, slot: &Mutex<Option<TrajectoryData>>) {
    let Some(snapshot) = slot.lock().unwrap().take() else {
        return;
    };

    let target = path.to_path_buf();
    match tokio::task::spawn_blocking(move || write_snapshot(&target, &snapshot)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("Failed to save trajectory to {}: {}", path.display(), e),
        Err(e) => log::warn!("Trajectory write task failed: {}", e),
    }
}

/// Serialize the complete document and write it to the trajectory path,
/// creating parent directories as needed.
pub(super) fn write_snapshot(path: &Path, data: &TrajectoryData) -> AgentResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AgentError::Persistence(format!("create {}: {}", parent.display(), e)))?;
        }
    }

    let json = serde_json::to_string_pretty(data)
        .map_err(|e| AgentError::Persistence(format!("serialize trajectory: {}", e)))?;
    std::fs::write(path, json)
        .map_err(|e| AgentError::Persistence(format!("write {}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_snapshot_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/trajectory.json");

        let data = TrajectoryData {
            task: "t".to_string(),
            ..Default::default()
        };
        write_snapshot(&path, &data).unwrap();

        let saved: TrajectoryData =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, data);
    }

    #[test]
    fn test_write_snapshot_failure_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory at the target path makes the write fail
        let path = dir.path().join("trajectory.json");
        std::fs::create_dir(&path).unwrap();

        let err = write_snapshot(&path, &TrajectoryData::default()).unwrap_err();
        assert!(matches!(err, AgentError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_shutdown_writes_newest_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajectory.json");
        let writer = TrajectoryWriter::spawn(path.clone());

        for i in 0..3 {
            writer.enqueue(TrajectoryData {
                task: format!("snapshot-{i}"),
                ..Default::default()
            });
        }
        writer.shutdown().await;

        let saved: TrajectoryData =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.task, "snapshot-2");
    }

    #[tokio::test]
    async fn test_snapshot_published_while_worker_idle_survives_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajectory.json");
        let writer = TrajectoryWriter::spawn(path.clone());

        // The worker never gets a chance to run before shutdown on a
        // current-thread runtime; the final drain must still write.
        for i in 0..20 {
            writer.enqueue(TrajectoryData {
                task: format!("snapshot-{i}"),
                ..Default::default()
            });
        }
        writer.shutdown().await;

        let saved: TrajectoryData =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.task, "snapshot-19");
    }
}
