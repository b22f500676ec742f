//! Wire message shapes (§6) and the dispatcher's outcome type.
//!
//! Encoding is delegated to the transport collaborator (§1 Non-goals:
//! "choice of wire encoding"); this module only defines the symbolic,
//! typed shape the dispatcher matches on.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::id::Id;

/// A stored record, as carried by STORE/VALUE and admitted into the
/// record store (C5/C9).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub key: Id,
    pub value: Vec<u8>,
    pub timestamp: u64,
    pub expires: u64,
    pub public_key: Vec<u8>,
    pub name: String,
    pub meta: Vec<u8>,
    pub signature: Vec<u8>,
}

/// The node/version pair every message carries (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node: Id,
    pub version: String,
}

/// A contact as carried in a NODES reply.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeTuple {
    pub id: Id,
    pub address: String,
    pub port: u16,
    pub version: String,
}

/// The eight wire message kinds (§6), as a tagged variant with an
/// exhaustive match replacing the duck-typed dispatch of the source
/// (§9 Design Notes).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    Ping {
        uuid: Uuid,
        node: Id,
        version: String,
    },
    Pong {
        uuid: Uuid,
        node: Id,
        version: String,
    },
    Store {
        uuid: Uuid,
        node: Id,
        version: String,
        record: Record,
    },
    FindNode {
        uuid: Uuid,
        node: Id,
        version: String,
        key: Id,
    },
    FindValue {
        uuid: Uuid,
        node: Id,
        version: String,
        key: Id,
    },
    Nodes {
        uuid: Uuid,
        node: Id,
        version: String,
        nodes: Vec<NodeTuple>,
    },
    Value {
        uuid: Uuid,
        node: Id,
        version: String,
        record: Record,
    },
    Error {
        uuid: Uuid,
        node: Id,
        version: String,
        code: u32,
        title: String,
        details: ErrorDetails,
    },
}

impl WireMessage {
    pub fn uuid(&self) -> Uuid {
        match self {
            WireMessage::Ping { uuid, .. }
            | WireMessage::Pong { uuid, .. }
            | WireMessage::Store { uuid, .. }
            | WireMessage::FindNode { uuid, .. }
            | WireMessage::FindValue { uuid, .. }
            | WireMessage::Nodes { uuid, .. }
            | WireMessage::Value { uuid, .. }
            | WireMessage::Error { uuid, .. } => *uuid,
        }
    }

    pub fn sender(&self) -> Id {
        match self {
            WireMessage::Ping { node, .. }
            | WireMessage::Pong { node, .. }
            | WireMessage::Store { node, .. }
            | WireMessage::FindNode { node, .. }
            | WireMessage::FindValue { node, .. }
            | WireMessage::Nodes { node, .. }
            | WireMessage::Value { node, .. }
            | WireMessage::Error { node, .. } => *node,
        }
    }

    pub fn version(&self) -> &str {
        match self {
            WireMessage::Ping { version, .. }
            | WireMessage::Pong { version, .. }
            | WireMessage::Store { version, .. }
            | WireMessage::FindNode { version, .. }
            | WireMessage::FindValue { version, .. }
            | WireMessage::Nodes { version, .. }
            | WireMessage::Value { version, .. }
            | WireMessage::Error { version, .. } => version,
        }
    }
}

/// Details carried by an ERROR message. `out_of_date` is the one code
/// (§6, §9) with a structured payload; everything else carries none.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ErrorDetails {
    /// `%d`-formatted in the original on a float timestamp (§9 Open
    /// Question 3); normalized here to integer milliseconds.
    pub new_timestamp: Option<u64>,
}

/// Stable integer error codes (§6). 0-15 reserved for the core.
pub mod error_code {
    pub const INVALID_MESSAGE: u32 = 1;
    pub const INVALID_SIGNATURE: u32 = 6;
    pub const OUT_OF_DATE: u32 = 8;
}

/// What the dispatcher decided to do with an inbound message (§10.6: the
/// source's `Error(code, title, details, uuid)` exception, reified as data
/// instead of thrown, so the dispatcher never constructs wire bytes
/// itself).
#[derive(Debug)]
pub enum DispatchOutcome {
    Reply(WireMessage),
    NoReply,
    ErrorReply {
        code: u32,
        title: String,
        details: ErrorDetails,
    },
}
