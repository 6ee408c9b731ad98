//! Checkpoint Store
//!
//! Append-only record of completed assessments. Each append is one
//! JSON-lines chunk written with a single `write_all` and synced before
//! returning, so a crash leaves at most one torn trailing line.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::{AppError, AppResult, RiskAssessment};

pub trait CheckpointStore: Send + Sync {
    /// Every assessment persisted so far, in append order
    fn load(&self) -> AppResult<Vec<RiskAssessment>>;

    /// Persist a chunk atomically; either all of it lands or none of it does
    fn append(&self, assessments: &[RiskAssessment]) -> AppResult<()>;
}

// ============================================
// JSONL FILE STORE
// ============================================

pub struct JsonlCheckpointStore {
    path: PathBuf,
}

impl JsonlCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(assessments: &[RiskAssessment]) -> AppResult<Vec<u8>> {
        let mut buffer = Vec::new();
        for assessment in assessments {
            serde_json::to_writer(&mut buffer, assessment)
                .map_err(|e| AppError::checkpoint_write("Failed to encode checkpoint entry", e))?;
            buffer.push(b'\n');
        }
        Ok(buffer)
    }

    /// Cut a torn tail so the next append starts on a clean line
    fn truncate_to(&self, len: usize) -> AppResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| AppError::checkpoint_write("Failed to open checkpoint for repair", e))?;
        file.set_len(len as u64)
            .and_then(|_| file.sync_data())
            .map_err(|e| AppError::checkpoint_write("Failed to truncate torn checkpoint tail", e))
    }
}

impl CheckpointStore for JsonlCheckpointStore {
    fn load(&self) -> AppResult<Vec<RiskAssessment>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("📂 No checkpoint at {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(AppError::checkpoint_corrupt(format!(
                    "Failed to read checkpoint {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let mut assessments = Vec::new();
        let mut offset = 0usize;
        let mut lines = content.split_inclusive('\n').peekable();

        while let Some(line) = lines.next() {
            let is_last = lines.peek().is_none();
            let trimmed = line.trim();

            if !trimmed.is_empty() {
                match serde_json::from_str::<RiskAssessment>(trimmed) {
                    Ok(assessment) => assessments.push(assessment),
                    Err(e) if is_last && !line.ends_with('\n') => {
                        warn!(
                            "⚠️ Discarding torn checkpoint tail in {} ({} bytes): {}",
                            self.path.display(),
                            line.len(),
                            e
                        );
                        self.truncate_to(offset)?;
                        break;
                    }
                    Err(e) => {
                        return Err(AppError::checkpoint_corrupt(format!(
                            "Corrupt checkpoint entry at byte {} of {}: {}",
                            offset,
                            self.path.display(),
                            e
                        )));
                    }
                }
            }
            offset += line.len();
        }

        info!("📂 Loaded {} checkpointed assessments from {}", assessments.len(), self.path.display());
        Ok(assessments)
    }

    fn append(&self, assessments: &[RiskAssessment]) -> AppResult<()> {
        if assessments.is_empty() {
            return Ok(());
        }
        let buffer = Self::encode(assessments)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::checkpoint_write("Failed to create checkpoint directory", e))?;
        }

        let mut file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::checkpoint_write(format!("Failed to open {}", self.path.display()), e))?;

        file.write_all(&buffer)
            .and_then(|_| file.sync_data())
            .map_err(|e| AppError::checkpoint_write(format!("Failed to append to {}", self.path.display()), e))?;

        debug!("💾 Checkpointed {} assessments", assessments.len());
        Ok(())
    }
}

// ============================================
// IN-MEMORY STORE
// ============================================

/// Store kept in memory, with optional failure injection
#[derive(Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<Vec<RiskAssessment>>,
    appends: Mutex<usize>,
    fail_from_append: Option<usize>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<RiskAssessment>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    /// Appends succeed `n` times, then every later append fails
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_from_append: Some(n),
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<RiskAssessment> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn append_count(&self) -> usize {
        self.appends.lock().map(|n| *n).unwrap_or_default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> AppResult<Vec<RiskAssessment>> {
        Ok(self.entries())
    }

    fn append(&self, assessments: &[RiskAssessment]) -> AppResult<()> {
        let mut appends = self
            .appends
            .lock()
            .map_err(|_| AppError::checkpoint_corrupt("Checkpoint lock poisoned"))?;

        if self.fail_from_append.is_some_and(|limit| *appends >= limit) {
            return Err(AppError::checkpoint_write(
                "Injected checkpoint failure",
                std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            ));
        }

        self.entries
            .lock()
            .map_err(|_| AppError::checkpoint_corrupt("Checkpoint lock poisoned"))?
            .extend_from_slice(assessments);
        *appends += 1;
        Ok(())
    }
}
