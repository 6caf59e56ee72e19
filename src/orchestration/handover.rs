//! # Inter-Node Handover
//!
//! The sending side wraps a task and its in-flight fulfillment into a
//! [`TaskHandoverPacket`] and maps the remote acknowledgement back onto the
//! task's outcome. The receiving side rebuilds a local task from the packet and
//! registers it through the local [`TaskQueueManager`].

use super::task_queue_manager::TaskQueueManager;
use crate::constants::reasons;
use crate::error::RpcResult;
use crate::messaging::{
    HandoverStatus, MessageAccounting, RpcClient, TaskHandoverPacket, TaskHandoverResponse,
};
use crate::models::{
    FulfillmentStatus, OutcomeStatus, PerformerDeclaration, SequenceGenerator, Task,
    TaskExecutionStatus, TaskFulfillment, TaskId, TaskTraceabilityElement,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Map a handover acknowledgement (or RPC failure) onto `task`'s outcome.
/// Only `received-and-decoded` for the same task counts as success.
pub fn apply_handover_response(task: &mut Task, result: &RpcResult<TaskHandoverResponse>) {
    match result {
        Ok(response)
            if response
                .task_id
                .as_ref()
                .is_some_and(|acknowledged| acknowledged != &task.task_id) =>
        {
            task.mark_failed(reasons::MISMATCH_MESSAGE_FLOWS)
        }
        Ok(response) => match response.status {
            HandoverStatus::ReceivedAndDecoded => task.mark_completed(),
            HandoverStatus::ReceivedButFailedDecoding => {
                task.mark_failed(reasons::MESSAGE_FAILED_DECODING)
            }
            HandoverStatus::ReceiveTimedOut => task.mark_failed(reasons::MESSAGE_SEND_TIMED_OUT),
        },
        Err(e) if e.is_timeout() => task.mark_failed(reasons::MESSAGE_SEND_TIMED_OUT),
        Err(e) => task.mark_failed(&format!("{}: {e}", reasons::MESSAGE_SEND_FAILED)),
    }
}

#[derive(Debug, Clone)]
pub struct HandoverSender {
    rpc: RpcClient,
    /// Address name of this node's tasking endpoint
    local_fulfiller: String,
}

impl HandoverSender {
    pub fn new(rpc: RpcClient, local_fulfiller: impl Into<String>) -> Self {
        Self {
            rpc,
            local_fulfiller: local_fulfiller.into(),
        }
    }

    pub fn build_packet(
        &self,
        task: &Task,
        source_participant: &str,
        target_participant: &str,
    ) -> TaskHandoverPacket {
        TaskHandoverPacket {
            packet_id: Uuid::new_v4(),
            upstream_fulfillment: TaskTraceabilityElement {
                fulfiller_id: self.local_fulfiller.clone(),
                task_id: task.task_id.clone(),
                registration_instant: task.fulfillment.registration_instant,
                start_instant: task.fulfillment.start_instant,
            },
            task: task.clone(),
            source_participant: source_participant.to_string(),
            target_participant: target_participant.to_string(),
            accounting: MessageAccounting {
                send_start: Utc::now(),
                transfer_count: task.traceability.upstream.len() as u32 + 1,
            },
        }
    }

    /// Hand `task` to the node at `target_address` and return it with its
    /// outcome recorded.
    pub async fn hand_over(
        &self,
        target_address: &str,
        mut task: Task,
        source_participant: &str,
        target_participant: &str,
    ) -> Task {
        let packet = self.build_packet(&task, source_participant, target_participant);

        task.fulfillment.fulfiller_id = Some(target_address.to_string());
        let result = self.rpc.handover(target_address, packet).await;
        apply_handover_response(&mut task, &result);

        match task.outcome.as_ref().map(|outcome| outcome.status) {
            Some(OutcomeStatus::Completed) => info!(
                task_id = %task.task_id,
                target = %target_address,
                "Task handed over"
            ),
            _ => warn!(
                task_id = %task.task_id,
                target = %target_address,
                reason = task.fulfillment.reason.as_deref().unwrap_or_default(),
                "Task handover failed"
            ),
        }
        task
    }
}

pub struct HandoverReceiver {
    manager: Arc<TaskQueueManager>,
    sequence: Arc<SequenceGenerator>,
    receive_timeout: Duration,
}

impl std::fmt::Debug for HandoverReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoverReceiver")
            .field("receive_timeout", &self.receive_timeout)
            .finish()
    }
}

impl HandoverReceiver {
    pub fn new(
        manager: Arc<TaskQueueManager>,
        sequence: Arc<SequenceGenerator>,
        receive_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            sequence,
            receive_timeout,
        }
    }

    /// Decode raw packet bytes; malformed input is answered, not raised
    pub async fn receive_encoded(&self, bytes: &[u8]) -> TaskHandoverResponse {
        match TaskHandoverPacket::decode(bytes) {
            Ok(packet) => self.receive(packet).await,
            Err(e) => {
                warn!(error = %e, "Received handover packet that failed decoding");
                TaskHandoverResponse::new(HandoverStatus::ReceivedButFailedDecoding)
                    .with_commentary(e.to_string())
            }
        }
    }

    pub async fn receive(&self, packet: TaskHandoverPacket) -> TaskHandoverResponse {
        let local = self.localise(&packet);
        let local_task_id = local.task_id.clone();

        match tokio::time::timeout(self.receive_timeout, self.manager.queue_task(local)).await {
            Ok(report) => {
                debug!(
                    task_id = %packet.task.task_id,
                    local_task_id = %local_task_id,
                    processed = report.processed_successfully(),
                    "Handover packet registered locally"
                );
                let mut response =
                    TaskHandoverResponse::for_packet(&packet, HandoverStatus::ReceivedAndDecoded);
                response.local_task_id = Some(local_task_id);
                if !report.processed_successfully() {
                    response = response.with_commentary("offloaded for every performer");
                }
                response
            }
            Err(_) => {
                warn!(
                    task_id = %packet.task.task_id,
                    timeout_ms = self.receive_timeout.as_millis() as u64,
                    "Timed out registering handed-over task"
                );
                TaskHandoverResponse::for_packet(&packet, HandoverStatus::ReceiveTimedOut)
            }
        }
    }

    /// Rebuild the packet's task as a fresh local task: new id, local sequence
    /// number, and the sender's fulfillment appended to the upstream trace.
    fn localise(&self, packet: &TaskHandoverPacket) -> Task {
        let performers = if packet.target_participant.trim().is_empty() {
            packet.task.performers.clone()
        } else {
            vec![PerformerDeclaration::participant(
                packet.target_participant.clone(),
            )]
        };

        let mut traceability = packet.task.traceability.clone();
        traceability.upstream.push(packet.upstream_fulfillment.clone());

        Task {
            task_id: TaskId::new(),
            sequence_number: Some(self.sequence.next_sequence()),
            performers,
            status: TaskExecutionStatus::Registered,
            fulfillment: TaskFulfillment {
                status: FulfillmentStatus::Registered,
                registration_instant: Some(Utc::now()),
                ..TaskFulfillment::default()
            },
            outcome: None,
            traceability,
            payload: packet.task.payload.clone(),
        }
    }
}
