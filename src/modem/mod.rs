//! Transport-agnostic AT-speaking modem driver (`spec.md` §4.9).

mod command_set;
mod connection;
mod driver;
mod transport;

pub use command_set::{GenericAtCommandSet, ModemCommandSet};
pub use connection::{Connection, ConnectionIndex, ConnectionTable};
pub use driver::{ModemDriver, ValueAction, ValueResolver};
pub use transport::ModemTransport;
