//! # Handover Message Structures
//!
//! Wire formats for moving a task, with its traceability metadata, from one
//! Processing Plant to another.

use crate::error::PetasosResult;
use crate::models::{Task, TaskId, TaskTraceabilityElement};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message accounting for a handover packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAccounting {
    /// When the sender began transmitting this packet
    pub send_start: DateTime<Utc>,
    /// How many times this task has crossed a node boundary
    pub transfer_count: u32,
}

impl Default for MessageAccounting {
    fn default() -> Self {
        Self {
            send_start: Utc::now(),
            transfer_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHandoverPacket {
    pub packet_id: Uuid,
    pub task: Task,
    /// The sending node's in-flight fulfillment of `task`
    pub upstream_fulfillment: TaskTraceabilityElement,
    pub source_participant: String,
    pub target_participant: String,
    pub accounting: MessageAccounting,
}

impl TaskHandoverPacket {
    pub fn encode(&self) -> PetasosResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> PetasosResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoverStatus {
    ReceivedAndDecoded,
    ReceivedButFailedDecoding,
    ReceiveTimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHandoverResponse {
    pub packet_id: Option<Uuid>,
    /// The sender's task id this response refers to, when it could be decoded
    pub task_id: Option<TaskId>,
    pub status: HandoverStatus,
    /// The task id registered on the receiving node
    pub local_task_id: Option<TaskId>,
    pub commentary: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl TaskHandoverResponse {
    pub fn new(status: HandoverStatus) -> Self {
        Self {
            packet_id: None,
            task_id: None,
            status,
            local_task_id: None,
            commentary: None,
            received_at: Utc::now(),
        }
    }

    pub fn for_packet(packet: &TaskHandoverPacket, status: HandoverStatus) -> Self {
        Self {
            packet_id: Some(packet.packet_id),
            task_id: Some(packet.task.task_id.clone()),
            ..Self::new(status)
        }
    }

    pub fn with_commentary(mut self, commentary: impl Into<String>) -> Self {
        self.commentary = Some(commentary.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskSequenceNumber;

    fn packet() -> TaskHandoverPacket {
        let task = Task::for_participant(TaskSequenceNumber(9), "lab-results");
        TaskHandoverPacket {
            packet_id: Uuid::new_v4(),
            upstream_fulfillment: TaskTraceabilityElement {
                fulfiller_id: "site-a::zone-1::ehr::tasking::n1".to_string(),
                task_id: task.task_id.clone(),
                registration_instant: Some(Utc::now()),
                start_instant: None,
            },
            task,
            source_participant: "ehr-egress".to_string(),
            target_participant: "lab-results".to_string(),
            accounting: MessageAccounting::default(),
        }
    }

    #[test]
    fn test_packet_encoding() {
        let original = packet();
        let decoded = TaskHandoverPacket::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(TaskHandoverPacket::decode(b"{\"packet_id\": 12}").is_err());
    }

    #[test]
    fn test_response_for_packet_refers_to_sender_task() {
        let packet = packet();
        let response = TaskHandoverResponse::for_packet(&packet, HandoverStatus::ReceiveTimedOut);
        assert_eq!(response.task_id.as_ref(), Some(&packet.task.task_id));
        assert_eq!(response.packet_id, Some(packet.packet_id));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "receive_timed_out");
    }
}
