use crate::action::{Action, ActionPtr, ActionProcessor, Stoppable, UpdateStatus};
use crate::event::Event;
use crate::time::Instant;
use std::rc::Rc;

use super::buffer::AtBuffer;
use super::dispatcher::AtDispatcher;

/// The serial port contract this subsystem consumes (`spec.md` §6.2).
/// Framing (`\r\n` line splitting) is entirely the AT layer's job; the port
/// itself only ever hands over opaque byte chunks in arrival order.
pub trait SerialPort {
    fn is_open(&self) -> bool;
    fn write(&mut self, bytes: &[u8]);
    fn read_event(&self) -> Event<Vec<u8>>;
}

/// A single fire-and-forget AT command write. `write` on the serial port
/// contract never blocks and never fails synchronously, so this action
/// always resolves `Result` on its first `update`.
pub struct AtWriteAction {
    done: bool,
}

impl AtWriteAction {
    pub(crate) fn new() -> AtWriteAction {
        AtWriteAction { done: false }
    }
}

impl Action for AtWriteAction {
    fn update(&mut self, _now: Instant) -> UpdateStatus {
        if self.done {
            UpdateStatus::Nothing
        } else {
            self.done = true;
            UpdateStatus::Result
        }
    }
}

impl Stoppable for AtWriteAction {
    fn stop(&mut self) {
        self.done = true;
    }
}

/// Positional parser for `"<prefix>: a,b,c"`-shaped AT responses
/// (`spec.md` §4.9: "why prefix matching, not full line equality").
pub fn parse_response(line: &str) -> Option<Vec<String>> {
    let (_prefix, rest) = line.split_once(": ")?;
    Some(rest.split(',').map(|field| field.trim().to_string()).collect())
}

/// Parses field `index` of a prefix-matched response as an integer,
/// honoring a `0x` prefix as hex (`spec.md` §6.4).
pub fn parse_field_i64(line: &str, index: usize) -> Option<i64> {
    let fields = parse_response(line)?;
    let field = fields.get(index)?;
    if let Some(hex) = field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        field.parse().ok()
    }
}

/// Bundles a port, its line buffer, and the dispatcher wired to it
/// (`spec.md` §4.9: "one `AtSupport` instance over that port").
pub struct AtSupport<P> {
    port: Rc<std::cell::RefCell<P>>,
    buffer: Rc<std::cell::RefCell<AtBuffer>>,
    dispatcher: Rc<AtDispatcher>,
    _read_sub: crate::event::Subscription<Vec<u8>>,
}

impl<P: SerialPort + 'static> AtSupport<P> {
    pub fn new(port: Rc<std::cell::RefCell<P>>) -> AtSupport<P> {
        let buffer = Rc::new(std::cell::RefCell::new(AtBuffer::new()));
        let dispatcher = Rc::new(AtDispatcher::new());

        let buffer_for_feed = buffer.clone();
        let dispatcher_for_feed = dispatcher.clone();
        let read_sub = port.borrow().read_event().subscribe(move |bytes: &Vec<u8>| {
            let first_new = {
                let mut buf = buffer_for_feed.borrow_mut();
                let before = buf.len();
                buf.feed(bytes);
                before
            };
            let mut buf = buffer_for_feed.borrow_mut();
            if buf.len() > first_new {
                dispatcher_for_feed.on_buffer_update(&mut buf, first_new);
            }
        });

        AtSupport {
            port,
            buffer,
            dispatcher,
            _read_sub: read_sub,
        }
    }

    pub fn dispatcher(&self) -> Rc<AtDispatcher> {
        self.dispatcher.clone()
    }

    pub fn buffer(&self) -> Rc<std::cell::RefCell<AtBuffer>> {
        self.buffer.clone()
    }

    /// Writes `command` plus a trailing `\r\n` and returns an action that
    /// resolves immediately (writes are fire-and-forget per the serial port
    /// contract; only the subsequent `AtRequest` waits are asynchronous).
    pub fn make_request(&self, processor: &ActionProcessor, command: &str) -> ActionPtr<AtWriteAction> {
        let mut line = command.as_bytes().to_vec();
        line.extend_from_slice(b"\r\n");
        self.port.borrow_mut().write(&line);
        processor.spawn(AtWriteAction::new())
    }

    /// Writes raw bytes with no framing, for modem commands that expect a
    /// payload to follow the command line directly (`spec.md` §4.9
    /// `WritePacket`).
    pub fn write_raw(&self, bytes: &[u8]) {
        self.port.borrow_mut().write(bytes);
    }
}
