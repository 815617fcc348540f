//! Small composable helpers shared across the runtime.

mod defer;
mod from_chars;
mod state_machine;

pub use defer::{defer, Defer};
pub use from_chars::{from_chars, FromStrRadix};
pub use state_machine::StateMachine;
