//! Workflow run tracker
//!
//! Owns the run lifecycle state machine: RUNNING is the sole non-terminal
//! state; COMPLETED, FAILED, and CANCELLED are terminal and written at most
//! once per run. Admission dedupes on `(workflow_id, user_id,
//! idempotency_key)`; termination signals are idempotent no-ops on conflict
//! because the underlying event bus delivers at least once.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::models::workflow_run;
use crate::realtime::{BusMessage, Channel, ChannelBus, StatusLabel, WorkflowUpdate};
use crate::repositories::WorkflowRunRepository;

/// Run lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
            RunStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    fn status_label(&self) -> StatusLabel {
        match self {
            RunStatus::Running => StatusLabel::Running,
            RunStatus::Completed => StatusLabel::Completed,
            RunStatus::Failed => StatusLabel::Failed,
            RunStatus::Cancelled => StatusLabel::Cancelled,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = RunStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(RunStatus::Running),
            "COMPLETED" => Ok(RunStatus::Completed),
            "FAILED" => Ok(RunStatus::Failed),
            "CANCELLED" => Ok(RunStatus::Cancelled),
            other => Err(RunStateError::UnknownStatus {
                status: other.to_string(),
            }),
        }
    }
}

/// Invariant violations inside the run state machine. These indicate bugs in
/// the caller and never surface to API clients.
#[derive(Debug, Error)]
pub enum RunStateError {
    #[error("transition target must be terminal, got {status}")]
    NonTerminalTransition { status: RunStatus },
    #[error("unknown run status '{status}'")]
    UnknownStatus { status: String },
}

/// Result of a run admission
#[derive(Debug)]
pub enum Admission {
    /// A new RUNNING row was inserted; side effects may start.
    Admitted(workflow_run::Model),
    /// A row already exists for the dedup triple; the caller must not start
    /// duplicate side effects.
    Deduplicated,
}

/// Tracks run lifecycle state and publishes terminal events for
/// externally-triggered cancellations
pub struct RunTracker {
    repo: WorkflowRunRepository,
    bus: Arc<dyn ChannelBus>,
}

impl RunTracker {
    pub fn new(repo: WorkflowRunRepository, bus: Arc<dyn ChannelBus>) -> Self {
        Self { repo, bus }
    }

    /// Admit a run, deduplicating on `(workflow_id, user_id,
    /// idempotency_key)` through an atomic insert-if-absent.
    #[instrument(skip_all, fields(workflow_id = %workflow_id, external_run_id = %external_run_id))]
    pub async fn admit(
        &self,
        workflow_id: &Uuid,
        user_id: &Uuid,
        idempotency_key: &str,
        external_run_id: &str,
        input: Option<serde_json::Value>,
    ) -> Result<Admission> {
        match self
            .repo
            .admit(workflow_id, user_id, idempotency_key, external_run_id, input)
            .await?
        {
            Some(run) => {
                counter!("workflow_runs_admitted_total").increment(1);
                info!(run_id = %run.id, "Admitted workflow run");
                Ok(Admission::Admitted(run))
            }
            None => {
                counter!("workflow_runs_deduplicated_total").increment(1);
                info!(
                    idempotency_key = %idempotency_key,
                    "Duplicate trigger for workflow run, skipping"
                );
                Ok(Admission::Deduplicated)
            }
        }
    }

    /// Transition a run to a terminal state. Idempotent: if the run is
    /// already terminal the call is a logged no-op, never an error, because
    /// duplicate termination signals are expected.
    #[instrument(skip_all, fields(external_run_id = %external_run_id, to = %to))]
    pub async fn transition(
        &self,
        external_run_id: &str,
        to: RunStatus,
        error: Option<&str>,
    ) -> Result<()> {
        if !to.is_terminal() {
            return Err(RunStateError::NonTerminalTransition { status: to }.into());
        }

        let updated = self.repo.transition(external_run_id, to.as_str(), error).await?;
        if updated == 0 {
            debug!("Run already terminal, transition ignored");
            counter!("workflow_run_transition_conflicts_total").increment(1);
        } else {
            counter!("workflow_run_transitions_total", "status" => to.as_str()).increment(1);
            info!("Workflow run transitioned");
        }
        Ok(())
    }

    /// Cancel whatever is currently running for this workflow and user.
    /// Matching deliberately ignores the idempotency key: a cancellation
    /// request targets "the current run of this workflow", not a specific
    /// attempt. Publishes a terminal status update per cancelled run.
    #[instrument(skip_all, fields(workflow_id = %workflow_id, user_id = %user_id))]
    pub async fn cancel(&self, workflow_id: &Uuid, user_id: &Uuid) -> Result<u64> {
        let running = self.repo.find_running(workflow_id, user_id).await?;
        if running.is_empty() {
            debug!("No running rows to cancel");
            return Ok(0);
        }

        let channel = Channel::new(*user_id, *workflow_id);
        let mut cancelled = 0u64;

        for run in running {
            // Conditional write per row: a run completing concurrently wins
            // and this cancel becomes a no-op for it
            let updated = self
                .repo
                .transition(&run.external_run_id, RunStatus::Cancelled.as_str(), None)
                .await?;
            if updated == 0 {
                warn!(run_id = %run.id, "Run reached a terminal state before cancellation");
                continue;
            }
            cancelled += 1;

            self.bus
                .publish(
                    &channel,
                    BusMessage::Update(WorkflowUpdate::status(
                        "Workflow run cancelled",
                        RunStatus::Cancelled.status_label(),
                    )),
                )
                .await;
        }

        counter!("workflow_runs_cancelled_total").increment(cancelled);
        info!(cancelled, "Cancellation processed");
        Ok(cancelled)
    }

    /// Fetch a run by the engine-assigned id
    pub async fn find_by_external_run_id(
        &self,
        external_run_id: &str,
    ) -> Result<Option<workflow_run::Model>> {
        self.repo.find_by_external_run_id(external_run_id).await
    }

    /// Run history for the dashboard, newest first
    pub async fn list_for_workflow(
        &self,
        workflow_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Vec<workflow_run::Model>> {
        self.repo.list_for_workflow(workflow_id, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("PENDING".parse::<RunStatus>().is_err());
    }
}
