use super::command_set::ModemCommandSet;
use super::connection::ConnectionIndex;
use super::driver::ModemDriver;
use crate::action::{ActionPtr, ActionProcessor, Status, Stoppable};
use crate::at::SerialPort;
use crate::buf::DataBuffer;
use crate::error::LinkError;
use crate::event::{Event, Subscription};
use crate::stream::{ByteIStream, ReadAction, StreamInfo, StreamWriteAction};
use crate::time::Duration;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// A single open connection over a modem, exposed as a [`ByteIStream`]
/// (`spec.md` §4.9, §4.10). Holds a non-owning reference to the
/// [`ModemDriver`]; dropping the transport releases the connection slot.
pub struct ModemTransport<P, C> {
    driver: Weak<ModemDriver<P, C>>,
    index: ConnectionIndex,
    processor: ActionProcessor,
    stream_update: Event<StreamInfo>,
    read_action: ActionPtr<ReadAction>,
    pending_subs: RefCell<Vec<Subscription<Status>>>,
    closed: RefCell<bool>,
}

impl<P: SerialPort + 'static, C: ModemCommandSet + 'static> ModemTransport<P, C> {
    pub fn new(driver: &Rc<ModemDriver<P, C>>, processor: ActionProcessor, index: ConnectionIndex) -> ModemTransport<P, C> {
        let read_action = processor.spawn(ReadAction::new());
        let transport = ModemTransport {
            driver: Rc::downgrade(driver),
            index,
            processor,
            stream_update: Event::new(),
            read_action,
            pending_subs: RefCell::new(Vec::new()),
            closed: RefCell::new(false),
        };
        transport.stream_update.emit(&StreamInfo::connected());
        transport
    }

    /// Polls the modem for pending bytes and feeds whatever arrives into
    /// this transport's `out_data_event`. Drivers without an unsolicited
    /// receive notification (`#XRECV`, `+CARECV`) must call this
    /// periodically; ones that do would instead drive `push` directly off
    /// a dedicated `AtListener` (`spec.md` §4.9).
    pub fn poll_read(&self, timeout: Duration) {
        let Some(driver) = self.driver.upgrade() else { return };
        let read_ptr = driver.read_packet(self.index, timeout);
        let read_ptr2 = read_ptr.clone();
        let read_action = self.read_action.clone();
        let stream_update = self.stream_update.clone();
        let sub = read_ptr.on_status(move |status| match status {
            Status::Result => {
                let data = read_ptr2.borrow().value().cloned();
                if let Some(data) = data {
                    if !data.is_empty() {
                        read_action.borrow_mut().push(data);
                    }
                }
            }
            Status::Error(e) => stream_update.emit(&StreamInfo::failed(LinkError::RecvFailed(e.to_string()))),
            Status::Stop => {}
        });
        self.pending_subs.borrow_mut().push(sub);
    }
}

impl<P: SerialPort + 'static, C: ModemCommandSet + 'static> ByteIStream for ModemTransport<P, C> {
    fn write(&self, data: DataBuffer) -> ActionPtr<StreamWriteAction> {
        let ptr = self.processor.spawn(StreamWriteAction::new(data.clone()));
        match self.driver.upgrade() {
            Some(driver) => {
                let len = data.len();
                let op = driver.write_packet(self.index, data);
                let ptr2 = ptr.clone();
                let sub = op.on_status(move |status| match status {
                    Status::Result => ptr2.borrow_mut().advance(len),
                    Status::Error(e) => ptr2.borrow_mut().fail(LinkError::SendFailed(e.to_string())),
                    Status::Stop => ptr2.borrow_mut().stop(),
                });
                self.pending_subs.borrow_mut().push(sub);
            }
            None => {
                ptr.borrow_mut().fail(LinkError::SendFailed("modem driver no longer available".into()));
            }
        }
        ptr
    }

    fn stream_update_event(&self) -> Event<StreamInfo> {
        self.stream_update.clone()
    }

    fn out_data_event(&self) -> Event<DataBuffer> {
        self.read_action.borrow().out_data_event()
    }

    fn restream(&self) {
        if let Some(driver) = self.driver.upgrade() {
            driver.close_network(self.index);
        }
        self.stream_update.emit(&StreamInfo::failed(LinkError::Stopped));
    }
}

impl<P: SerialPort + 'static, C: ModemCommandSet + 'static> Drop for ModemTransport<P, C> {
    fn drop(&mut self) {
        self.read_action.borrow_mut().stop();
        if *self.closed.borrow() {
            return;
        }
        *self.closed.borrow_mut() = true;
        if let Some(driver) = self.driver.upgrade() {
            driver.close_network(self.index);
        }
    }
}
