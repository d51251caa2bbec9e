//! Bidirectional control channel between the controller and the engine.
//!
//! Each direction is an unbounded FIFO queue, so messages arrive in send order
//! per direction. Nothing orders one direction against the other.

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::message::{ControlMessage, Envelope};

/// Creates a connected pair of channel ends.
pub fn control_channel() -> (ControllerEnd, EngineEnd) {
    let (to_engine, from_controller) = unbounded();
    let (to_controller, from_engine) = unbounded();
    (
        ControllerEnd {
            to_engine,
            from_engine,
        },
        EngineEnd {
            from_controller,
            to_controller,
        },
    )
}

/// The controller's side: sends envelopes, receives engine messages.
#[derive(Debug)]
pub struct ControllerEnd {
    to_engine: Sender<Envelope>,
    from_engine: Receiver<ControlMessage>,
}

impl ControllerEnd {
    /// Returns `false` if the engine side is gone.
    pub fn send(&self, envelope: Envelope) -> bool {
        self.to_engine.send(envelope).is_ok()
    }

    pub fn events(&self) -> &Receiver<ControlMessage> {
        &self.from_engine
    }
}

/// The engine's side: receives envelopes, sends progress and completion.
#[derive(Debug)]
pub struct EngineEnd {
    from_controller: Receiver<Envelope>,
    to_controller: Sender<ControlMessage>,
}

impl EngineEnd {
    /// Best-effort send; a controller that has gone away is not an error for
    /// the engine.
    pub fn emit(&self, message: ControlMessage) {
        if self.to_controller.send(message).is_err() {
            tracing::trace!("controller end dropped, discarding message");
        }
    }

    pub fn requests(&self) -> &Receiver<Envelope> {
        &self.from_controller
    }
}
