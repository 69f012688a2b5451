//! Messages exchanged between the daemon and its clients.
//!
//! Every message is one JSON object tagged by its `type`:
//!
//! ```text
//! client ──► {"type":"GetIdentifiedUsers"}
//! daemon ◄── {"type":"IdentifiedUsers","users":[{"identification_id":"SCARD-04a1b2c3","seat_id":0}]}
//!
//! client ──► {"type":"GetSources"}
//! daemon ◄── {"type":"Sources","enabled":["SCARD"],"disabled":["MSD"]}
//!
//! client ──► {"type":"Monitor"}
//! daemon ◄── {"type":"Monitoring"}
//! daemon ◄── {"type":"UserIdentified","user":{...}}   (repeated)
//! ```

use serde::{Deserialize, Serialize};
use uim_core::IdentifiedUser;

/// Client to daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    GetIdentifiedUsers,
    GetSources,
    /// Turn the connection into a stream of `UserIdentified` notifications.
    Monitor,
}

/// Daemon to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Remembered users, oldest first.
    IdentifiedUsers { users: Vec<IdentifiedUser> },

    Sources {
        enabled: Vec<String>,
        disabled: Vec<String>,
    },

    /// Acknowledges `Monitor`. Every user identified after it is streamed.
    Monitoring,

    UserIdentified { user: IdentifiedUser },

    /// The request could not be decoded. The daemon closes the connection
    /// after sending it.
    Error { message: String },
}
