//! # Publisher/Subscriber Registration
//!
//! The registry behind both roles a node plays in data distribution:
//!
//! ```text
//! publisher role:  register_publisher, handle_subscription_request ──→ SubscriptionWiring
//! subscriber role: add_subscription_interest, subscribe_to_remote_publishers,
//!                  perform_subscription_check (independent timer)
//! ```

pub mod publisher_subscriber_registry;
pub mod wiring;

pub use publisher_subscriber_registry::{PublisherSubscriberRegistry, SubscriptionCheckReport};
pub use wiring::{LoggingSubscriptionWiring, SubscriptionWiring};
