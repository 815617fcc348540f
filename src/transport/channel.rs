//! `Channel`: the abstract node between an access point and a concrete
//! transport (`spec.md` §4.10).

use crate::action::{ActionPtr, ActionProcessor};
use crate::modem::ValueAction;
use crate::stream::ByteIStream;
use std::rc::Rc;

/// Whether a channel carries an ordered connection (`Full`, e.g. TCP) or is
/// connectionless (`Less`, e.g. UDP).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Full,
    Less,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reliability {
    Reliable,
    Unreliable,
}

#[derive(Debug, Clone, Copy)]
pub struct ChannelProperties {
    pub max_packet_size: usize,
    pub rec_packet_size: usize,
    pub connection_type: ConnectionType,
    pub reliability: Reliability,
}

/// Resolves to a live [`ByteIStream`], type-erased so `Adapter` can hold a
/// list of heterogeneous builders (socket-backed, modem-backed) started
/// from different `Channel` implementations.
pub type TransportBuilderAction = ValueAction<Rc<dyn ByteIStream>>;

/// A named path from this device to a remote endpoint over one specific
/// transport family. `Adapter::create_transport` enumerates one or more of
/// these for a destination; the caller tries builders in order until one
/// succeeds.
pub trait Channel {
    fn transport_builder(&self, processor: &ActionProcessor) -> ActionPtr<TransportBuilderAction>;
    fn properties(&self) -> ChannelProperties;
}
