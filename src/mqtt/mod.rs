pub mod session;
pub mod topic;
pub mod tracker;

// Re-export all public items to maintain compatibility
pub use session::{
    ConnectionListener, HandlerError, MqttSession, SessionError, SessionState, WILL_PAYLOAD,
    WILL_TOPIC,
};
pub use topic::{matching_filter, prefixed_filter, topic_matches};
pub use tracker::AckTracker;
