//! # Data Model
//!
//! Tasks, participant state, endpoint identities and publisher/subscriber
//! registrations.

pub mod endpoint;
pub mod participant;
pub mod registration;
pub mod task;

pub use endpoint::{
    CheckKind, CheckScheduleElement, EndpointDescriptor, EndpointFunctionType,
    EndpointIdentifier, EndpointNameResolver, EndpointRecord, EndpointStatus, NodeIdentity,
};
pub use participant::{ParticipantActivity, ParticipantSnapshot, ParticipantState};
pub use registration::{
    DataParcelManifest, PublisherRegistration, PublisherStatus, SubscriberRegistration,
    SubscriptionRegistration, SubscriptionRequest, SubscriptionResponse, SubscriptionStatus,
};
pub use task::{
    FulfillmentStatus, OutcomeStatus, PerformerDeclaration, SequenceGenerator, Task,
    TaskExecutionStatus, TaskFulfillment, TaskId, TaskOutcome, TaskSequenceNumber,
    TaskTraceability, TaskTraceabilityElement,
};
