use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use waypoint_types::{CanonicalState, EventEnvelope, RunId};

use crate::checkpoint::CheckpointEntry;
use crate::diff::diff_states;
use crate::error::StoreError;
use waypoint_wire::Patch;

/// Append-only checkpoint store (spec.md §4.4). Mirrors
/// `tandem-core::storage::Storage`'s "load everything into memory at
/// startup, mutate behind an `RwLock`, persist incrementally" shape, but
/// the persistence half is an append-only JSONL file per run rather than
/// a whole-snapshot rewrite: checkpoints are history, not a single
/// current record, so every `Append` is one `write` + `flush`, never a
/// full-file rewrite.
pub struct CheckpointStore {
    base_dir: PathBuf,
    runs: RwLock<HashMap<RunId, Vec<CheckpointEntry>>>,
}

impl CheckpointStore {
    /// Opens (or creates) the store rooted at `base_dir`. Existing runs
    /// under `{base_dir}/runs/*/checkpoints.jsonl` are loaded eagerly so
    /// `Latest`/`Get` never touch disk on the hot path.
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Arc<Self>, StoreError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(base_dir.join("runs")).await?;

        let mut runs = HashMap::new();
        let mut entries = fs::read_dir(base_dir.join("runs")).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let run_id = RunId::from_opaque(entry.file_name().to_string_lossy().into_owned());
            let path = checkpoint_log_path(&base_dir, &run_id);
            match load_log(&path).await {
                Ok(loaded) if !loaded.is_empty() => {
                    runs.insert(run_id, loaded);
                }
                Ok(_) => {}
                Err(err) => warn!(run_id = %run_id, error = %err, "skipping unreadable checkpoint log"),
            }
        }
        debug!(runs = runs.len(), "checkpoint store opened");

        Ok(Arc::new(Self {
            base_dir,
            runs: RwLock::new(runs),
        }))
    }

    /// Appends a new checkpoint for `run_id`, returning its index. The
    /// write to disk happens before the in-memory index is updated and
    /// before this call returns, so a caller publishing `state_checkpointed`
    /// only after `Append` resolves satisfies the durability-before-event
    /// fence (spec.md §4.4, invariant list in §7).
    pub async fn append(
        &self,
        run_id: RunId,
        state: CanonicalState,
        event_tail: Vec<EventEnvelope>,
    ) -> Result<u64, StoreError> {
        let mut runs = self.runs.write().await;
        let log = runs.entry(run_id.clone()).or_default();
        let index = log.len() as u64;
        let entry = CheckpointEntry::new(run_id.clone(), index, state, event_tail);

        append_to_disk(&self.base_dir, &entry)
            .await
            .map_err(|source| StoreError::Append {
                run_id: run_id.clone(),
                source,
            })?;

        log.push(entry);
        Ok(index)
    }

    /// `Latest(run_id) -> (checkpoint_index, state)`.
    pub async fn latest(&self, run_id: &RunId) -> Result<CheckpointEntry, StoreError> {
        let runs = self.runs.read().await;
        runs.get(run_id)
            .and_then(|log| log.last())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(run_id.clone()))
    }

    /// `Get(run_id, index) -> state`.
    pub async fn get(&self, run_id: &RunId, index: u64) -> Result<CheckpointEntry, StoreError> {
        let runs = self.runs.read().await;
        runs.get(run_id)
            .and_then(|log| log.get(index as usize))
            .cloned()
            .ok_or_else(|| StoreError::IndexNotFound {
                run_id: run_id.clone(),
                index,
            })
    }

    /// Every checkpoint for a run, oldest first. Used to build the replay
    /// tail a late SSE subscriber receives (spec.md §4.5).
    pub async fn history(&self, run_id: &RunId) -> Result<Vec<CheckpointEntry>, StoreError> {
        let runs = self.runs.read().await;
        runs.get(run_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(run_id.clone()))
    }

    /// `Diff(run_id, a, b) -> patch_list`.
    pub async fn diff(&self, run_id: &RunId, a: u64, b: u64) -> Result<Vec<Patch>, StoreError> {
        let from = self.get(run_id, a).await?;
        let to = self.get(run_id, b).await?;
        Ok(diff_states(&from.state, &to.state))
    }

    /// Every run with at least one checkpoint on disk. Used by
    /// `migrate-check` to scan stored schema versions before the server
    /// starts serving traffic against them.
    pub async fn run_ids(&self) -> Vec<RunId> {
        self.runs.read().await.keys().cloned().collect()
    }
}

fn checkpoint_log_path(base_dir: &Path, run_id: &RunId) -> PathBuf {
    base_dir
        .join("runs")
        .join(run_id.as_str())
        .join("checkpoints.jsonl")
}

async fn append_to_disk(base_dir: &Path, entry: &CheckpointEntry) -> std::io::Result<()> {
    let path = checkpoint_log_path(base_dir, &entry.run_id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut line = serde_json::to_vec(entry).expect("CheckpointEntry always serializes");
    line.push(b'\n');

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(&line).await?;
    file.flush().await?;
    file.sync_data().await
}

async fn load_log(path: &Path) -> Result<Vec<CheckpointEntry>, StoreError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(StoreError::Io(err)),
    };

    let mut out = Vec::new();
    let mut offset = 0u64;
    for line in bytes.split(|b| *b == b'\n') {
        if line.is_empty() {
            offset += 1;
            continue;
        }
        let entry: CheckpointEntry =
            serde_json::from_slice(line).map_err(|source| StoreError::Corrupt {
                run_id: RunId::from_opaque("unknown"),
                offset,
                source,
            })?;
        offset += line.len() as u64 + 1;
        out.push(entry);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_types::{ProjectId, ScenarioId};

    fn fresh_state(run_id: &RunId) -> CanonicalState {
        CanonicalState::new(run_id.clone(), ScenarioId::new(), ProjectId::new())
    }

    #[tokio::test]
    async fn append_then_latest_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).await.unwrap();
        let run_id = RunId::new();
        let state = fresh_state(&run_id);

        let index = store
            .append(run_id.clone(), state.clone(), Vec::new())
            .await
            .unwrap();
        assert_eq!(index, 0);

        let latest = store.latest(&run_id).await.unwrap();
        assert_eq!(latest.index, 0);
        assert_eq!(latest.state.meta.run_id.as_str(), run_id.as_str());
    }

    #[tokio::test]
    async fn checkpoint_index_is_strictly_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).await.unwrap();
        let run_id = RunId::new();

        for expected in 0..3u64 {
            let mut state = fresh_state(&run_id);
            state.meta.touch();
            let index = store
                .append(run_id.clone(), state, Vec::new())
                .await
                .unwrap();
            assert_eq!(index, expected);
        }
        assert_eq!(store.history(&run_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn reopening_the_store_reloads_history_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = RunId::new();
        {
            let store = CheckpointStore::open(dir.path()).await.unwrap();
            store
                .append(run_id.clone(), fresh_state(&run_id), Vec::new())
                .await
                .unwrap();
            store
                .append(run_id.clone(), fresh_state(&run_id), Vec::new())
                .await
                .unwrap();
        }

        let reopened = CheckpointStore::open(dir.path()).await.unwrap();
        let history = reopened.history(&run_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].index, 1);
    }

    #[tokio::test]
    async fn get_unknown_index_is_index_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).await.unwrap();
        let run_id = RunId::new();
        store
            .append(run_id.clone(), fresh_state(&run_id), Vec::new())
            .await
            .unwrap();

        let err = store.get(&run_id, 5).await.unwrap_err();
        assert!(matches!(err, StoreError::IndexNotFound { index: 5, .. }));
    }

    #[tokio::test]
    async fn diff_reflects_name_change_between_two_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).await.unwrap();
        let run_id = RunId::new();
        store
            .append(run_id.clone(), fresh_state(&run_id), Vec::new())
            .await
            .unwrap();

        let mut renamed = fresh_state(&run_id);
        renamed.idea.name = "Renamed idea".to_string();
        store
            .append(run_id.clone(), renamed, Vec::new())
            .await
            .unwrap();

        let patches = store.diff(&run_id, 0, 1).await.unwrap();
        assert!(patches.iter().any(|p| p.path == "/idea/name"));
    }

    #[tokio::test]
    async fn latest_on_unknown_run_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).await.unwrap();
        let err = store.latest(&RunId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
