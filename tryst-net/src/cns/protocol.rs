//! Request/response protocol of the name service, carried on
//! [`crate::wire::TAG_NAME`] as serde-encoded payloads.
//!
//! One request is answered by exactly one response, in order, per
//! connection.

use serde::{Deserialize, Serialize};

use super::registry::{NameRegistry, OwnerId};
use crate::endpoint::ChannelLocation;

/// A request to the name service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameRequest {
    /// Bind `name` to `location` for `owner`.
    Register {
        /// Symbolic channel name.
        name: String,
        /// Advertised location.
        location: ChannelLocation,
        /// Identity to capture as the binding's owner.
        owner: OwnerId,
    },
    /// Look up the location bound to `name`.
    Resolve {
        /// Symbolic channel name.
        name: String,
    },
    /// Retract the binding for `name`, if `owner` created it.
    Deregister {
        /// Symbolic channel name.
        name: String,
        /// Identity claiming ownership.
        owner: OwnerId,
    },
}

/// The name service's answer to one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameResponse {
    /// The mutation was applied.
    Ok,
    /// The resolved location.
    Location(ChannelLocation),
    /// The name is bound by a different owner.
    NameInUse {
        /// The contested name.
        name: String,
    },
    /// No binding exists for the name.
    NotFound {
        /// The unresolved name.
        name: String,
    },
    /// The caller is not the binding's owner.
    NotOwner {
        /// The protected name.
        name: String,
    },
}

/// Apply one request to a registry and produce its response.
pub fn apply(registry: &NameRegistry, request: NameRequest) -> NameResponse {
    use crate::error::NameError;

    let result = match request {
        NameRequest::Register {
            name,
            location,
            owner,
        } => registry.register(&name, location, owner).map(|()| NameResponse::Ok),
        NameRequest::Resolve { name } => registry.resolve(&name).map(NameResponse::Location),
        NameRequest::Deregister { name, owner } => {
            registry.deregister(&name, owner).map(|()| NameResponse::Ok)
        }
    };

    match result {
        Ok(response) => response,
        Err(NameError::NameInUse { name }) => NameResponse::NameInUse { name },
        Err(NameError::NotFound { name }) => NameResponse::NotFound { name },
        Err(NameError::NotOwner { name }) => NameResponse::NotOwner { name },
        // The registry itself never raises transport faults.
        Err(NameError::Transport(detail)) => {
            unreachable!("registry raised transport fault: {detail}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(tag: u32) -> ChannelLocation {
        ChannelLocation {
            addr: "10.0.0.1:4500".to_string(),
            tag,
        }
    }

    #[test]
    fn test_request_response_roundtrip_through_serde() {
        let request = NameRequest::Register {
            name: "sensor.feed".to_string(),
            location: location(12),
            owner: OwnerId::from_raw(42),
        };
        let bytes = serde_json::to_vec(&request).expect("encode");
        let decoded: NameRequest = serde_json::from_slice(&bytes).expect("decode");
        assert_eq!(decoded, request);

        let response = NameResponse::Location(location(12));
        let bytes = serde_json::to_vec(&response).expect("encode");
        let decoded: NameResponse = serde_json::from_slice(&bytes).expect("decode");
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_apply_covers_the_protocol_table() {
        let registry = NameRegistry::new();
        let owner = OwnerId::from_raw(1);
        let intruder = OwnerId::from_raw(2);

        // REGISTER -> OK
        let response = apply(
            &registry,
            NameRequest::Register {
                name: "X".to_string(),
                location: location(8),
                owner,
            },
        );
        assert_eq!(response, NameResponse::Ok);

        // REGISTER by someone else -> NAME_IN_USE
        let response = apply(
            &registry,
            NameRequest::Register {
                name: "X".to_string(),
                location: location(9),
                owner: intruder,
            },
        );
        assert_eq!(
            response,
            NameResponse::NameInUse {
                name: "X".to_string()
            }
        );

        // RESOLVE -> location
        let response = apply(
            &registry,
            NameRequest::Resolve {
                name: "X".to_string(),
            },
        );
        assert_eq!(response, NameResponse::Location(location(8)));

        // RESOLVE unknown -> NOT_FOUND
        let response = apply(
            &registry,
            NameRequest::Resolve {
                name: "Y".to_string(),
            },
        );
        assert_eq!(
            response,
            NameResponse::NotFound {
                name: "Y".to_string()
            }
        );

        // DEREGISTER by non-owner -> NOT_OWNER, binding intact
        let response = apply(
            &registry,
            NameRequest::Deregister {
                name: "X".to_string(),
                owner: intruder,
            },
        );
        assert_eq!(
            response,
            NameResponse::NotOwner {
                name: "X".to_string()
            }
        );
        assert_eq!(registry.resolve("X"), Ok(location(8)));

        // DEREGISTER by owner -> OK
        let response = apply(
            &registry,
            NameRequest::Deregister {
                name: "X".to_string(),
                owner,
            },
        );
        assert_eq!(response, NameResponse::Ok);
    }
}
