#![cfg(feature = "modem")]

mod util;

use linkcore::action::{Action, ActionProcessor, UpdateStatus};
use linkcore::at::SerialPort;
use linkcore::event::Event;
use linkcore::modem::{GenericAtCommandSet, ModemDriver};
use linkcore::time::Instant;
use linkcore::transport::ModemAccessPoint;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A serial port that answers every write with a bare `OK` line one tick
/// later, enough to drive `ModemDriver::start`'s init pipeline to
/// completion without a real modem.
struct EchoPort {
    read_event: Event<Vec<u8>>,
    pending: VecDeque<Vec<u8>>,
    writes: u32,
}

impl EchoPort {
    fn new() -> EchoPort {
        EchoPort {
            read_event: Event::new(),
            pending: VecDeque::new(),
            writes: 0,
        }
    }
}

impl SerialPort for EchoPort {
    fn is_open(&self) -> bool {
        true
    }

    fn write(&mut self, _bytes: &[u8]) {
        self.writes += 1;
        self.pending.push_back(b"OK\r\n".to_vec());
    }

    fn read_event(&self) -> Event<Vec<u8>> {
        self.read_event.clone()
    }
}

/// Flushes one pending response per tick.
struct PortPump {
    port: Rc<RefCell<EchoPort>>,
}

impl Action for PortPump {
    fn update(&mut self, _now: Instant) -> UpdateStatus {
        let next = self.port.borrow_mut().pending.pop_front();
        if let Some(bytes) = next {
            self.port.borrow().read_event.emit(&bytes);
        }
        UpdateStatus::Nothing
    }
}

/// S6: concurrent `connect()` calls before the first resolves share one
/// underlying action, so only a single init sequence ever runs.
#[test]
fn concurrent_connects_share_one_in_flight_action() {
    util::init();
    let processor = ActionProcessor::new();
    let port = Rc::new(RefCell::new(EchoPort::new()));
    processor.spawn(PortPump { port: port.clone() });

    let driver = Rc::new(ModemDriver::new(
        processor.clone(),
        port.clone(),
        GenericAtCommandSet,
        Default::default(),
    ));
    let access_point = ModemAccessPoint::new(driver, "internet");

    let first = access_point.connect();
    let second = access_point.connect();
    assert!(!first.is_finished());
    assert!(!second.is_finished());

    util::run_until(&processor, 200, || first.is_finished());

    assert!(
        second.is_finished(),
        "a call deduplicated onto the same action finishes exactly when the first does"
    );
    assert_eq!(
        port.borrow().writes,
        6,
        "exactly one init sequence (six commands) should have run"
    );

    // Once finished, a fresh `connect()` starts a new attempt rather than
    // replaying the stale result.
    let third = access_point.connect();
    assert!(!third.is_finished());
}
