pub mod heartbeat;
pub mod membership;
pub mod messages;

pub use membership::{ClusterView, MemberStatus, Membership};
