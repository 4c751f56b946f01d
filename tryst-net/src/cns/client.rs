//! Name client: talks to a [`super::NameServer`] over its own link.

use tokio::net::TcpStream;

use super::protocol::{NameRequest, NameResponse};
use super::registry::OwnerId;
use crate::config::LinkConfig;
use crate::endpoint::ChannelLocation;
use crate::error::NameError;
use crate::link::Link;
use crate::wire::{Frame, TAG_NAME};

/// A connected name-service client carrying its own owner identity.
///
/// All registrations made through one client belong to that client's
/// identity; only the same client (or one restored with
/// [`NameClient::with_owner`]) can retract them. Name faults are returned to
/// the caller and never propagate: retrying or picking another name is the
/// caller's decision.
pub struct NameClient {
    link: Link<TcpStream>,
    owner: OwnerId,
}

impl NameClient {
    /// Connect to the name server at `addr` with a fresh owner identity.
    ///
    /// # Errors
    ///
    /// `NameError::Transport` if the link cannot be established.
    pub async fn connect(addr: &str, config: LinkConfig) -> Result<Self, NameError> {
        Self::with_owner(addr, config, OwnerId::generate()).await
    }

    /// Connect with an explicit owner identity.
    ///
    /// # Errors
    ///
    /// `NameError::Transport` if the link cannot be established.
    pub async fn with_owner(
        addr: &str,
        config: LinkConfig,
        owner: OwnerId,
    ) -> Result<Self, NameError> {
        let link = Link::connect(addr, config)
            .await
            .map_err(|e| NameError::Transport(e.to_string()))?;
        Ok(Self { link, owner })
    }

    /// This client's owner identity.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Register `name` at `location` under this client's identity.
    ///
    /// # Errors
    ///
    /// `NameInUse` if the name belongs to someone else; `Transport` on link
    /// failure.
    pub async fn register(
        &mut self,
        name: &str,
        location: &ChannelLocation,
    ) -> Result<(), NameError> {
        let request = NameRequest::Register {
            name: name.to_string(),
            location: location.clone(),
            owner: self.owner,
        };
        match self.request(request).await? {
            NameResponse::Ok => Ok(()),
            NameResponse::NameInUse { name } => Err(NameError::NameInUse { name }),
            other => Err(unexpected(other)),
        }
    }

    /// Resolve `name` to its advertised location.
    ///
    /// # Errors
    ///
    /// `NotFound` if the name is unbound; `Transport` on link failure.
    pub async fn resolve(&mut self, name: &str) -> Result<ChannelLocation, NameError> {
        let request = NameRequest::Resolve {
            name: name.to_string(),
        };
        match self.request(request).await? {
            NameResponse::Location(location) => Ok(location),
            NameResponse::NotFound { name } => Err(NameError::NotFound { name }),
            other => Err(unexpected(other)),
        }
    }

    /// Retract the binding for `name`.
    ///
    /// # Errors
    ///
    /// `NotOwner` if this client's identity did not register the name;
    /// `Transport` on link failure.
    pub async fn deregister(&mut self, name: &str) -> Result<(), NameError> {
        let request = NameRequest::Deregister {
            name: name.to_string(),
            owner: self.owner,
        };
        match self.request(request).await? {
            NameResponse::Ok => Ok(()),
            NameResponse::NotOwner { name } => Err(NameError::NotOwner { name }),
            other => Err(unexpected(other)),
        }
    }

    /// One request, one response, in order.
    async fn request(&mut self, request: NameRequest) -> Result<NameResponse, NameError> {
        let payload =
            serde_json::to_vec(&request).map_err(|e| NameError::Transport(e.to_string()))?;
        self.link
            .send(&Frame::new(TAG_NAME, payload))
            .await
            .map_err(|e| NameError::Transport(e.to_string()))?;

        let frame = self
            .link
            .recv()
            .await
            .map_err(|e| NameError::Transport(e.to_string()))?;
        if frame.tag != TAG_NAME {
            return Err(NameError::Transport(format!(
                "unexpected tag {} on name link",
                frame.tag
            )));
        }
        serde_json::from_slice(&frame.payload).map_err(|e| NameError::Transport(e.to_string()))
    }
}

fn unexpected(response: NameResponse) -> NameError {
    NameError::Transport(format!("unexpected name service response: {response:?}"))
}
