//! In-process name registry with owner-checked mutation.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::endpoint::ChannelLocation;
use crate::error::NameError;

/// Opaque owner identity, captured when a name is registered.
///
/// Generated from 64 bits of randomness on the client; ownership checks
/// compare tokens, never names or addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Generate a fresh owner identity.
    pub fn generate() -> Self {
        Self(rand::random())
    }

    /// Wrap an explicit identity value (e.g. restored from elsewhere).
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// One registered name: who owns it and where the channel lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameBinding {
    /// Identity captured at registration.
    pub owner: OwnerId,
    /// Advertised network location.
    pub location: ChannelLocation,
}

/// Registry mapping symbolic names to locations. Process-lifetime only; no
/// persistence.
#[derive(Default)]
pub struct NameRegistry {
    bindings: Mutex<HashMap<String, NameBinding>>,
}

impl NameRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` at `location` for `owner`.
    ///
    /// Re-registration by the same owner updates the location (idempotent
    /// for identical calls).
    ///
    /// # Errors
    ///
    /// `NameInUse` if the name is bound by a different owner.
    pub fn register(
        &self,
        name: &str,
        location: ChannelLocation,
        owner: OwnerId,
    ) -> Result<(), NameError> {
        let mut bindings = self.bindings.lock().expect("registry mutex poisoned");
        if let Some(existing) = bindings.get(name) {
            if existing.owner != owner {
                return Err(NameError::NameInUse {
                    name: name.to_string(),
                });
            }
        }
        bindings.insert(name.to_string(), NameBinding { owner, location });
        Ok(())
    }

    /// Look up the location bound to `name`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the name is unbound.
    pub fn resolve(&self, name: &str) -> Result<ChannelLocation, NameError> {
        let bindings = self.bindings.lock().expect("registry mutex poisoned");
        bindings
            .get(name)
            .map(|binding| binding.location.clone())
            .ok_or_else(|| NameError::NotFound {
                name: name.to_string(),
            })
    }

    /// Retract the binding for `name`.
    ///
    /// # Errors
    ///
    /// `NotOwner` if `owner` did not create the binding, including when no
    /// binding exists, so probing cannot distinguish the two cases. The
    /// binding is left intact on failure.
    pub fn deregister(&self, name: &str, owner: OwnerId) -> Result<(), NameError> {
        let mut bindings = self.bindings.lock().expect("registry mutex poisoned");
        match bindings.get(name) {
            Some(binding) if binding.owner == owner => {
                bindings.remove(name);
                Ok(())
            }
            _ => Err(NameError::NotOwner {
                name: name.to_string(),
            }),
        }
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.bindings.lock().expect("registry mutex poisoned").len()
    }

    /// Whether the registry holds no bindings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
