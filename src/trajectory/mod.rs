//! Batched, durably persisted execution history.
//!
//! The recorder keeps the full trajectory document in memory, appends LLM
//! interactions and agent steps synchronously, and flushes the complete
//! snapshot to disk every `batch_size` appends or on finalize. Flushing can
//! run on a serialized background worker so recording stays off the I/O
//! path. Flush failures are logged, never raised: recording continues with
//! an acknowledged data-loss window until the next successful flush.

use crate::tools::{ToolCall, ToolResult};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

mod writer;

use writer::TrajectoryWriter;

/// Default number of appends between flushes
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Token accounting for one LLM response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cache_creation_input_tokens: Option<u64>,
    pub cache_read_input_tokens: Option<u64>,
    pub reasoning_tokens: Option<u64>,
}

/// One message in an LLM conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl LlmMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_call: None,
            tool_result: None,
        }
    }
}

/// One LLM response as recorded in the trajectory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponseRecord {
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
    pub usage: Option<LlmUsage>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// One recorded LLM interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmInteraction {
    pub timestamp: String,
    pub provider: String,
    pub model: String,
    pub input_messages: Vec<LlmMessage>,
    pub response: LlmResponseRecord,
    pub tools_available: Option<Vec<String>>,
}

/// One recorded agent execution step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    pub step_number: u32,
    #[serde(default)]
    pub timestamp: String,
    pub state: String,
    pub llm_messages: Option<Vec<LlmMessage>>,
    pub llm_response: Option<LlmResponseRecord>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub tool_results: Option<Vec<ToolResult>>,
    pub reflection: Option<String>,
    pub error: Option<String>,
}

/// The persisted trajectory document. Stable, additive-only schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryData {
    pub task: String,
    pub start_time: String,
    pub end_time: String,
    pub provider: String,
    pub model: String,
    pub max_steps: u32,
    pub llm_interactions: Vec<LlmInteraction>,
    pub agent_steps: Vec<AgentStep>,
    pub success: bool,
    pub final_result: Option<String>,
    /// Wall-clock duration in seconds, stamped at finalize
    pub execution_time: f64,
}

/// Recorder lifecycle; `Finalized` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Finalized,
}

/// Records agent execution history with batched durable persistence.
///
/// With `max_interactions` set, the interaction list is a sliding window:
/// once exceeded, the oldest record is dropped at append time and is not
/// recoverable from the persisted snapshot. This is a deliberate
/// memory/completeness trade-off.
pub struct TrajectoryRecorder {
    path: PathBuf,
    batch_size: usize,
    max_interactions: Option<usize>,
    state: RecorderState,
    data: TrajectoryData,
    pending_writes: usize,
    started_at: Option<Instant>,
    writer: Option<TrajectoryWriter>,
}

impl TrajectoryRecorder {
    /// Create a recorder writing to `path`.
    ///
    /// `background_io` dispatches flushes to a dedicated serialized worker;
    /// it requires a running tokio runtime.
    pub fn new(
        path: Option<PathBuf>,
        batch_size: usize,
        max_interactions: Option<usize>,
        background_io: bool,
    ) -> Self {
        let path = path.unwrap_or_else(default_trajectory_path);
        let writer = background_io.then(|| TrajectoryWriter::spawn(path.clone()));

        Self {
            path,
            batch_size,
            max_interactions,
            state: RecorderState::Idle,
            data: TrajectoryData::default(),
            pending_writes: 0,
            started_at: None,
            writer,
        }
    }

    /// Synchronous recorder with default batching
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self::new(Some(path.into()), DEFAULT_BATCH_SIZE, None, false)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Appends recorded since the last flush
    pub fn pending_writes(&self) -> usize {
        self.pending_writes
    }

    /// Begin recording. Stamps the header, clears record lists and flushes
    /// immediately so a trajectory file exists from the start.
    pub fn start(&mut self, task: &str, provider: &str, model: &str, max_steps: u32) {
        if self.state != RecorderState::Idle {
            log::warn!("Trajectory recorder already started, ignoring start()");
            return;
        }

        self.started_at = Some(Instant::now());
        self.data.task = task.to_string();
        self.data.start_time = Utc::now().to_rfc3339();
        self.data.provider = provider.to_string();
        self.data.model = model.to_string();
        self.data.max_steps = max_steps;
        self.data.llm_interactions.clear();
        self.data.agent_steps.clear();
        self.state = RecorderState::Recording;

        self.flush();
    }

    /// Append an LLM interaction. In-memory only; never fails.
    pub fn record_interaction(&mut self, mut interaction: LlmInteraction) {
        if self.state == RecorderState::Finalized {
            log::debug!("Trajectory finalized, dropping interaction record");
            return;
        }

        if interaction.timestamp.is_empty() {
            interaction.timestamp = Utc::now().to_rfc3339();
        }
        self.data.llm_interactions.push(interaction);

        // Sliding window: oldest interaction dropped once the cap is exceeded
        if let Some(max) = self.max_interactions {
            if self.data.llm_interactions.len() > max {
                self.data.llm_interactions.remove(0);
            }
        }

        self.bump_pending();
    }

    /// Append an agent step. In-memory only; never fails.
    pub fn record_step(&mut self, mut step: AgentStep) {
        if self.state == RecorderState::Finalized {
            log::debug!("Trajectory finalized, dropping step record");
            return;
        }

        if step.timestamp.is_empty() {
            step.timestamp = Utc::now().to_rfc3339();
        }
        self.data.agent_steps.push(step);
        self.bump_pending();
    }

    /// Stamp end time and duration, force a flush and terminate recording.
    /// Once finalized the document is immutable; repeated calls are ignored.
    pub fn finalize(&mut self, success: bool, final_result: Option<String>) {
        if self.state != RecorderState::Recording {
            log::warn!("Trajectory recorder not recording, ignoring finalize()");
            return;
        }

        self.data.end_time = Utc::now().to_rfc3339();
        self.data.success = success;
        self.data.final_result = final_result;
        self.data.execution_time = self
            .started_at
            .map(|s| s.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        self.flush();
        self.pending_writes = 0;
        self.state = RecorderState::Finalized;
    }

    /// Persist the complete current snapshot.
    ///
    /// Background mode publishes to the serialized worker, which always
    /// writes the newest snapshot; otherwise the write happens inline.
    /// Failures are logged, never raised.
    pub fn flush(&mut self) {
        let snapshot = self.data.clone();
        match &self.writer {
            Some(writer) => writer.enqueue(snapshot),
            None => {
                if let Err(e) = writer::write_snapshot(&self.path, &snapshot) {
                    log::warn!(
                        "Failed to save trajectory to {}: {}",
                        self.path.display(),
                        e
                    );
                }
            }
        }
    }

    /// Drain the background worker. No recorded data is lost once this
    /// returns. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.shutdown().await;
        }
    }

    /// Snapshot of the current in-memory document
    pub fn data(&self) -> &TrajectoryData {
        &self.data
    }

    fn bump_pending(&mut self) {
        self.pending_writes += 1;
        if self.pending_writes >= self.batch_size {
            self.flush();
            self.pending_writes = 0;
        }
    }
}

fn default_trajectory_path() -> PathBuf {
    PathBuf::from(format!(
        "trajectory_{}.json",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}
