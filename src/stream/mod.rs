//! Byte stream contract and send queue (`spec.md` §4.6).

mod read_action;
mod send_queue;

pub use read_action::ReadAction;
pub use send_queue::{SendQueueManager, SocketPacketSendAction};

use crate::action::{Action, Stoppable, UpdateStatus};
use crate::error::LinkError;
use crate::event::Event;
use crate::time::Instant;
use std::rc::Rc;

/// Snapshot of a stream's liveness, emitted on every state change.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub connected: bool,
    pub writable: bool,
    pub error: Option<Rc<LinkError>>,
}

impl StreamInfo {
    pub fn connected() -> StreamInfo {
        StreamInfo {
            connected: true,
            writable: false,
            error: None,
        }
    }

    pub fn failed(err: LinkError) -> StreamInfo {
        StreamInfo {
            connected: false,
            writable: false,
            error: Some(Rc::new(err)),
        }
    }
}

/// A reconnectable, ordered byte transport: the common shape of a modem
/// packet channel and a TCP/UDP channel above the raw socket layer.
pub trait ByteIStream {
    fn write(&self, data: crate::buf::DataBuffer) -> crate::action::ActionPtr<StreamWriteAction>;
    fn stream_update_event(&self) -> Event<StreamInfo>;
    fn out_data_event(&self) -> Event<crate::buf::DataBuffer>;
    /// Requests a fresh underlying link; implementations tear down the
    /// current one and emit a `StreamInfo` carrying the reason.
    fn restream(&self);
}

#[derive(Debug, Clone)]
enum WriteOutcome {
    Pending,
    Sent,
    Failed(Rc<LinkError>),
    Stopped,
}

/// One queued write; terminal status matches `spec.md` §4.6: Result = fully
/// sent, Error = transport failure, Stop = caller cancelled.
pub struct StreamWriteAction {
    data: crate::buf::DataBuffer,
    offset: usize,
    outcome: WriteOutcome,
}

impl StreamWriteAction {
    pub(crate) fn new(data: crate::buf::DataBuffer) -> StreamWriteAction {
        StreamWriteAction {
            data,
            offset: 0,
            outcome: WriteOutcome::Pending,
        }
    }

    pub(crate) fn remaining(&self) -> &[u8] {
        &self.data[self.offset..]
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.offset += n;
        if self.offset >= self.data.len() {
            self.outcome = WriteOutcome::Sent;
        }
    }

    pub(crate) fn fail(&mut self, err: LinkError) {
        if matches!(self.outcome, WriteOutcome::Pending) {
            self.outcome = WriteOutcome::Failed(Rc::new(err));
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(self.outcome, WriteOutcome::Pending)
    }
}

impl Action for StreamWriteAction {
    fn update(&mut self, _now: Instant) -> UpdateStatus {
        match &self.outcome {
            WriteOutcome::Pending => UpdateStatus::Nothing,
            WriteOutcome::Sent => UpdateStatus::Result,
            WriteOutcome::Failed(e) => UpdateStatus::Error(LinkError::SendFailed(e.to_string())),
            WriteOutcome::Stopped => UpdateStatus::Stop,
        }
    }
}

impl Stoppable for StreamWriteAction {
    fn stop(&mut self) {
        if matches!(self.outcome, WriteOutcome::Pending) {
            self.outcome = WriteOutcome::Stopped;
        }
    }
}
