// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opaque identifiers for nodes, actors and the overlays they own.
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of every identifier in bytes.
pub const ID_LEN: usize = 16;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name([u8; ID_LEN]);

        impl $name {
            /// Generates a new identifier from the thread-local random number generator.
            pub fn random() -> Self {
                Self(rand::random())
            }

            pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; ID_LEN] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(value)?;
                let bytes: [u8; ID_LEN] = bytes
                    .try_into()
                    .map_err(|bytes: Vec<u8>| IdError::InvalidLength(bytes.len()))?;
                Ok(Self(bytes))
            }
        }
    };
}

identifier!(
    /// Identifier of an account, root space or subspace.
    NodeId
);

identifier!(
    /// Identifier of the actor (agent) behind a node, holder of credentials.
    ActorId
);

identifier!(
    /// Identifier of an authorization policy record.
    PolicyId
);

identifier!(
    /// Identifier of a license record.
    LicenseId
);

#[derive(Debug, Error)]
pub enum IdError {
    #[error("invalid hex encoding in identifier: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("invalid identifier length {0}, expected {ID_LEN} bytes")]
    InvalidLength(usize),
}
