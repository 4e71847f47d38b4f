pub mod engine;
pub mod message;
pub mod subscriber;
pub mod topic;

pub use engine::Broker;
pub use message::{Message, Priority};
pub use subscriber::{
    AsyncSubscriber, Subscriber, SubscriberConfig, SubscriberId, SubscriberState,
    SubscriberStats,
};
pub use topic::{SharedSubscriber, Topic};
