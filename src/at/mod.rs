//! AT-command subsystem: line buffering, prefix dispatch, and request
//! state machines (`spec.md` §4.7, §4.8).

mod buffer;
mod dispatcher;
mod listener;
mod request;
mod support;

pub use buffer::AtBuffer;
pub use dispatcher::{AtDispatcher, AtObserver};
pub use listener::AtListener;
pub use request::{AtRequest, RetryPolicy, Wait};
pub use support::{parse_field_i64, parse_response, AtSupport, AtWriteAction, SerialPort};
