/// Messages exchanged between nodes over the peer transport.
/// These are NOT part of the public API - they are the internal wire
/// contract between a node and the current counter-owner.
use serde::{Deserialize, Serialize};

use crate::limiter::counter_store::Verdict;
use crate::singleton::registry::SingletonHandle;

/// Atomic check-and-increment against the counter-owner. Carries the
/// caller's believed incarnation so a superseded owner is never counted
/// against.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncrementRequest {
    pub name: String,
    pub incarnation: u64,
    pub key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncrementResponse {
    pub result: Verdict,
    pub calls_remaining: u32,
    pub window_id: u64,
}

/// Read-only quota probe; does not consume quota.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeekRequest {
    pub name: String,
    pub incarnation: u64,
    pub key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeekResponse {
    pub calls_remaining: u32,
    pub window_id: u64,
}

/// Singleton directory announcements between supervisors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RegistryUpdate {
    Register { handle: SingletonHandle },
    Unregister { name: String, incarnation: u64 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LookupResponse {
    pub handle: Option<SingletonHandle>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnnounceAck {
    pub applied: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::node_id::NodeName;

    #[test]
    fn test_increment_round_trip() {
        let request = IncrementRequest {
            name: "rate_limiter".to_string(),
            incarnation: 3,
            key: "127.0.0.1".to_string(),
        };
        let serialized = serde_json::to_string(&request).unwrap();
        let deserialized: IncrementRequest = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.name, "rate_limiter");
        assert_eq!(deserialized.incarnation, 3);
        assert_eq!(deserialized.key, "127.0.0.1");
    }

    #[test]
    fn test_response_wire_format() {
        let response = IncrementResponse {
            result: Verdict::Allowed,
            calls_remaining: 1,
            window_id: 0,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["result"], "allowed");

        let denied = IncrementResponse {
            result: Verdict::Denied,
            calls_remaining: 0,
            window_id: 0,
        };
        let json = serde_json::to_value(&denied).unwrap();
        assert_eq!(json["result"], "denied");
    }

    #[test]
    fn test_registry_update_round_trip() {
        let update = RegistryUpdate::Register {
            handle: SingletonHandle {
                name: "rate_limiter".to_string(),
                owner: NodeName::from("http://10.0.0.1:8620"),
                incarnation: 2,
            },
        };
        let serialized = serde_json::to_string(&update).unwrap();
        let deserialized: RegistryUpdate = serde_json::from_str(&serialized).unwrap();
        match deserialized {
            RegistryUpdate::Register { handle } => {
                assert_eq!(handle.incarnation, 2);
                assert_eq!(handle.owner.as_str(), "http://10.0.0.1:8620");
            }
            _ => panic!("Wrong update type"),
        }
    }
}
