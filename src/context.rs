//! Workflow execution context builder
//!
//! Composes run admission, credential resolution, and realtime publishing
//! into the context a workflow body receives. The builder is the only entry
//! point the durable-execution engine calls: it admits the run (deduped),
//! resolves credentials just in time, hands the body a publish handle, and
//! guarantees exactly one terminal transition no matter how the body ends.

use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::credential_store::{CredentialStore, ResolvedCredential};
use crate::providers::Provider;
use crate::realtime::{
    AiStreamMessage, BusMessage, Channel, ChannelBus, StatusLabel, WorkflowUpdate,
};
use crate::realtime::channel::ResultData;
use crate::runs::{Admission, RunStatus, RunTracker};

/// Inbound trigger contract the execution engine satisfies
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub event_name: String,
    pub data: TriggerData,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerData {
    #[schema(value_type = String)]
    pub workflow_id: Uuid,
    #[schema(value_type = String)]
    pub user_id: Uuid,
    pub idempotency_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

/// How an execution ended
#[derive(Debug)]
pub enum RunOutcome {
    /// A run for the same dedup triple already exists; the body never ran.
    Deduplicated,
    Completed(serde_json::Value),
    Failed(String),
    Cancelled,
}

/// Context handed to a workflow body
pub struct ExecutionContext {
    pub credentials: Vec<ResolvedCredential>,
    pub input: Option<serde_json::Value>,
    channel: Channel,
    bus: Arc<dyn ChannelBus>,
    cancellation: CancellationToken,
}

impl ExecutionContext {
    /// First resolved credential for a provider, if any
    pub fn credential(&self, provider: Provider) -> Option<&ResolvedCredential> {
        self.credentials.iter().find(|c| c.provider == provider)
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Cooperative cancellation signal mirroring the engine's
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Publish an update on the run's channel. Fire-and-forget.
    pub async fn publish(&self, update: WorkflowUpdate) {
        self.bus.publish(&self.channel, BusMessage::Update(update)).await;
    }

    /// Publish a chunk on the ai-stream topic
    pub async fn publish_ai_chunk(&self, message: AiStreamMessage) {
        self.bus
            .publish(&self.channel, BusMessage::AiStream(message))
            .await;
    }

    /// Publish a status update
    pub async fn update_status(&self, label: StatusLabel, message: impl Into<String>) {
        self.publish(WorkflowUpdate::status(message, label)).await;
    }
}

/// Builds execution contexts and drives the run lifecycle around a body
pub struct ExecutionContextBuilder {
    credentials: Arc<CredentialStore>,
    tracker: Arc<RunTracker>,
    bus: Arc<dyn ChannelBus>,
}

impl ExecutionContextBuilder {
    pub fn new(
        credentials: Arc<CredentialStore>,
        tracker: Arc<RunTracker>,
        bus: Arc<dyn ChannelBus>,
    ) -> Self {
        Self {
            credentials,
            tracker,
            bus,
        }
    }

    /// Admit, resolve, run, and terminate one workflow execution.
    ///
    /// The terminal transition is idempotent: if an external cancellation
    /// wrote CANCELLED while the body was finishing, the later COMPLETED
    /// write is a no-op and the recorded state stays CANCELLED.
    #[instrument(skip_all, fields(
        workflow_id = %trigger.data.workflow_id,
        external_run_id = %external_run_id,
    ))]
    pub async fn execute<F, Fut>(
        &self,
        trigger: TriggerEvent,
        external_run_id: &str,
        required_providers: &[Provider],
        cancellation: CancellationToken,
        body: F,
    ) -> Result<RunOutcome>
    where
        F: FnOnce(ExecutionContext) -> Fut,
        Fut: Future<Output = Result<serde_json::Value>>,
    {
        let TriggerData {
            workflow_id,
            user_id,
            idempotency_key,
            input,
        } = trigger.data;
        let channel = Channel::new(user_id, workflow_id);

        let admission = self
            .tracker
            .admit(
                &workflow_id,
                &user_id,
                &idempotency_key,
                external_run_id,
                input.clone(),
            )
            .await?;
        if matches!(admission, Admission::Deduplicated) {
            return Ok(RunOutcome::Deduplicated);
        }

        let credentials = match self
            .credentials
            .resolve(&workflow_id, required_providers)
            .await
        {
            Ok(credentials) => credentials,
            Err(err) => {
                let message = err.to_string();
                error!(error = %message, "Credential resolution failed, failing run");
                self.tracker
                    .transition(external_run_id, RunStatus::Failed, Some(&message))
                    .await?;
                self.bus
                    .publish(
                        &channel,
                        BusMessage::Update(WorkflowUpdate::result(
                            "Workflow failed before start",
                            ResultData {
                                success: false,
                                output: None,
                                error: Some(message.clone()),
                                execution_time: None,
                            },
                        )),
                    )
                    .await;
                return Ok(RunOutcome::Failed(message));
            }
        };

        for credential in &credentials {
            if credential.stale_warning {
                warn!(
                    credential_id = %credential.id,
                    provider = %credential.provider,
                    "Proceeding with stale token after failed refresh"
                );
            }
        }

        let context = ExecutionContext {
            credentials,
            input,
            channel,
            bus: Arc::clone(&self.bus),
            cancellation: cancellation.clone(),
        };
        context
            .update_status(StatusLabel::Running, "Workflow run started")
            .await;

        let started = std::time::Instant::now();
        let outcome = tokio::select! {
            result = body(context) => result,
            _ = cancellation.cancelled() => {
                info!("Cancellation signal received during execution");
                self.tracker
                    .transition(external_run_id, RunStatus::Cancelled, None)
                    .await?;
                self.bus
                    .publish(
                        &channel,
                        BusMessage::Update(WorkflowUpdate::status(
                            "Workflow run cancelled",
                            StatusLabel::Cancelled,
                        )),
                    )
                    .await;
                return Ok(RunOutcome::Cancelled);
            }
        };
        let execution_time = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                self.tracker
                    .transition(external_run_id, RunStatus::Completed, None)
                    .await?;
                self.bus
                    .publish(
                        &channel,
                        BusMessage::Update(WorkflowUpdate::result(
                            "Workflow completed",
                            ResultData {
                                success: true,
                                output: Some(output.clone()),
                                error: None,
                                execution_time: Some(execution_time),
                            },
                        )),
                    )
                    .await;
                Ok(RunOutcome::Completed(output))
            }
            Err(err) => {
                let message = err.to_string();
                error!(error = %message, "Workflow body failed");
                self.tracker
                    .transition(external_run_id, RunStatus::Failed, Some(&message))
                    .await?;
                self.bus
                    .publish(
                        &channel,
                        BusMessage::Update(WorkflowUpdate::result(
                            "Workflow failed",
                            ResultData {
                                success: false,
                                output: None,
                                error: Some(message.clone()),
                                execution_time: Some(execution_time),
                            },
                        )),
                    )
                    .await;
                Ok(RunOutcome::Failed(message))
            }
        }
    }
}
