//! Control channel messages.
//!
//! Message bodies are plain values that are copied across the channel. The
//! region travels next to the body as a reference in [`Envelope::region`], the
//! same way a transfer list rides along with a posted message, so the payload
//! itself is never copied.
//!
//! Wire shapes (JSON, tag and field names fixed for interop):
//!
//! ```text
//! {"type":"compute-shared","bufferSize":<u64>,"iterations":<u64>}
//! {"type":"progress","percent":<0..=100>}
//! {"type":"shared-complete"}
//! ```

use serde::{Deserialize, Serialize};

use crate::region::RegionHandle;

pub const COMPUTE_SHARED: &str = "compute-shared";
pub const PROGRESS: &str = "progress";
pub const SHARED_COMPLETE: &str = "shared-complete";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// Controller to engine: start computing over the attached region.
    ComputeShared {
        #[serde(rename = "bufferSize")]
        buffer_size: u64,
        iterations: u64,
    },
    /// Engine to controller: interim progress.
    Progress { percent: u8 },
    /// Engine to controller: the sync word has been set. Sent exactly once.
    SharedComplete {},
}

impl ControlMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            ControlMessage::ComputeShared { .. } => COMPUTE_SHARED,
            ControlMessage::Progress { .. } => PROGRESS,
            ControlMessage::SharedComplete {} => SHARED_COMPLETE,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        // Serializing a derived enum of integers cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// A controller-to-engine message: a copied body plus an optional region
/// reference.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub body: serde_json::Value,
    pub region: Option<RegionHandle>,
}

impl Envelope {
    /// Builds the `compute-shared` start request for `region`.
    pub fn compute_shared(region: RegionHandle, iterations: u64) -> Self {
        let message = ControlMessage::ComputeShared {
            buffer_size: region.buffer_size() as u64,
            iterations,
        };
        Envelope {
            body: message.to_json(),
            region: Some(region),
        }
    }

    /// The body's `type` field, if it has one.
    pub fn tag(&self) -> Option<&str> {
        self.body.get("type").and_then(serde_json::Value::as_str)
    }
}
