//! Transport builder graph: resolves a destination address to a concrete
//! [`crate::stream::ByteIStream`] (`spec.md` §4.10).

mod adapter;
mod channel;

#[cfg(feature = "modem")]
mod modem_channel;

// See `lib.rs`: `net` has no Windows socket backend yet, so the channel
// built on top of it is scoped the same way.
#[cfg(all(feature = "net", unix))]
mod tcp_channel;

pub use adapter::{Adapter, AdapterAction};
pub use channel::{Channel, ChannelProperties, ConnectionType, Reliability, TransportBuilderAction};

#[cfg(feature = "modem")]
pub use modem_channel::{ModemAccessPoint, ModemChannel};

#[cfg(all(feature = "net", unix))]
pub use tcp_channel::{TcpChannel, UdpChannel};
