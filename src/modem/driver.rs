use super::command_set::ModemCommandSet;
use super::connection::{Connection, ConnectionIndex, ConnectionTable};
use crate::action::{Action, ActionPtr, ActionProcessor, ActionsQueue, Pipeline, Status, StageFactory, StageHandle, Stoppable, UpdateStatus};
use crate::address::Protocol;
use crate::at::{AtRequest, AtSupport, RetryPolicy, SerialPort, Wait, parse_field_i64};
use crate::buf::DataBuffer;
use crate::error::LinkError;
use crate::time::{Duration, Instant};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

enum PendingOutcome<T> {
    Result(T),
    Error(LinkError),
    Stop,
}

struct ValueShared<T> {
    outcome: RefCell<Option<PendingOutcome<T>>>,
    sub: RefCell<Option<crate::event::Subscription<Status>>>,
}

/// A modem operation in flight. Resolves with `T` on success; see
/// `ModemDriver`'s public methods, each of which spawns one of these
/// immediately and defers the actual AT work onto `operation_queue_`.
pub struct ValueAction<T> {
    shared: Rc<ValueShared<T>>,
    value: Option<T>,
}

impl<T: 'static> ValueAction<T> {
    fn new_pending() -> (ValueAction<T>, Rc<ValueShared<T>>) {
        let shared = Rc::new(ValueShared {
            outcome: RefCell::new(None),
            sub: RefCell::new(None),
        });
        (
            ValueAction {
                shared: shared.clone(),
                value: None,
            },
            shared,
        )
    }

    /// Creates a pending action plus a handle a collaborator outside this
    /// module can resolve directly, mirroring `dns::ResolveHandle`. Used by
    /// `transport::modem_channel`'s connect deduplication, where several
    /// callers must share one in-flight `ModemConnectAction`.
    pub fn new_handle() -> (ValueAction<T>, ValueResolver<T>) {
        let (action, shared) = ValueAction::new_pending();
        (action, ValueResolver { shared })
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

/// The write side of a [`ValueAction`] created via
/// [`ValueAction::new_handle`].
pub struct ValueResolver<T> {
    shared: Rc<ValueShared<T>>,
}

impl<T: 'static> Clone for ValueResolver<T> {
    fn clone(&self) -> ValueResolver<T> {
        ValueResolver {
            shared: self.shared.clone(),
        }
    }
}

impl<T: 'static> ValueResolver<T> {
    pub fn resolve(&self, value: T) {
        let mut outcome = self.shared.outcome.borrow_mut();
        if outcome.is_none() {
            *outcome = Some(PendingOutcome::Result(value));
        }
    }

    pub fn fail(&self, err: LinkError) {
        let mut outcome = self.shared.outcome.borrow_mut();
        if outcome.is_none() {
            *outcome = Some(PendingOutcome::Error(err));
        }
    }
}

impl<T: 'static> Action for ValueAction<T> {
    fn update(&mut self, _now: Instant) -> UpdateStatus {
        match self.shared.outcome.borrow_mut().take() {
            Some(PendingOutcome::Result(v)) => {
                self.value = Some(v);
                UpdateStatus::Result
            }
            Some(PendingOutcome::Error(e)) => UpdateStatus::Error(e),
            Some(PendingOutcome::Stop) => UpdateStatus::Stop,
            None => UpdateStatus::Nothing,
        }
    }
}

impl<T: 'static> Stoppable for ValueAction<T> {
    fn stop(&mut self) {
        *self.shared.outcome.borrow_mut() = Some(PendingOutcome::Stop);
    }
}

/// Subscribes to `source`'s terminal status and resolves `shared` once,
/// running `on_result` to produce the success value. Keeps the subscription
/// alive on `shared` itself so it isn't dropped (and silenced) before firing.
fn bridge<T, S>(shared: &Rc<ValueShared<T>>, source: &ActionPtr<S>, on_result: impl FnOnce() -> T + 'static)
where
    T: 'static,
    S: Action,
{
    let shared2 = shared.clone();
    let mut on_result = Some(on_result);
    let sub = source.on_status(move |status| {
        let mut outcome = shared2.outcome.borrow_mut();
        *outcome = Some(match status {
            Status::Result => PendingOutcome::Result(on_result.take().expect("terminal status fires once")()),
            Status::Error(e) => PendingOutcome::Error(LinkError::SendFailed(e.to_string())),
            Status::Stop => PendingOutcome::Stop,
        });
    });
    *shared.sub.borrow_mut() = Some(sub);
}

fn ok_request<P: SerialPort + 'static>(
    support: &Rc<AtSupport<P>>,
    processor: &ActionProcessor,
    command: String,
    timeout: Duration,
    retry: RetryPolicy,
) -> ActionPtr<AtRequest> {
    let dispatcher = support.dispatcher();
    let support2 = support.clone();
    let processor2 = processor.clone();
    processor.spawn(AtRequest::new(
        dispatcher,
        move || support2.make_request(&processor2, &command),
        vec![Wait::new("OK", timeout)],
        retry,
    ))
}

/// Owns a serial port, the `AtSupport` over it, and a stoppable operation
/// queue that serializes every AT exchange (`spec.md` §4.9). All public
/// operations return immediately with an `ActionPtr` and perform their
/// actual AT work through `operation_queue_`, so initialization, connection
/// opening, writes, and reads never interleave on the wire.
pub struct ModemDriver<P, C> {
    support: Rc<AtSupport<P>>,
    commands: Rc<C>,
    processor: ActionProcessor,
    operation_queue: ActionsQueue,
    connections: Rc<RefCell<ConnectionTable>>,
    retry: RetryPolicy,
}

impl<P: SerialPort + 'static, C: ModemCommandSet + 'static> ModemDriver<P, C> {
    pub fn new(processor: ActionProcessor, port: Rc<RefCell<P>>, commands: C, retry: RetryPolicy) -> ModemDriver<P, C> {
        ModemDriver {
            support: Rc::new(AtSupport::new(port)),
            commands: Rc::new(commands),
            operation_queue: ActionsQueue::new(processor.clone()),
            processor,
            connections: Rc::new(RefCell::new(ConnectionTable::new())),
            retry,
        }
    }

    pub fn connections(&self) -> Rc<RefCell<ConnectionTable>> {
        self.connections.clone()
    }

    pub fn commands(&self) -> &Rc<C> {
        &self.commands
    }

    /// Runs the vendor init pipeline (echo off, extended errors on, SIM
    /// check, network registration, APN setup, context activation); any
    /// stage failing fails the whole `Start`.
    pub fn start(&self, apn: &str) -> ActionPtr<ValueAction<()>> {
        let (action, shared) = ValueAction::new_pending();
        let ptr = self.processor.spawn(action);

        let init_commands = self.commands.init_sequence(apn);
        let support = self.support.clone();
        let retry = self.retry;

        #[cfg(feature = "log")]
        log::debug!("modem: starting init pipeline ({} commands) for apn {apn:?}", init_commands.len());

        self.operation_queue.push(Box::new(move |proc: &ActionProcessor| {
            let proc_for_pipeline = proc.clone();
            let stages: Vec<StageFactory> = init_commands
                .iter()
                .cloned()
                .map(|cmd| {
                    let support = support.clone();
                    Box::new(move |proc: &ActionProcessor| {
                        #[cfg(feature = "log")]
                        log::trace!("modem: init pipeline stage sending {cmd:?}");
                        let request = ok_request(&support, proc, cmd.clone(), Duration::from_secs(5), retry);
                        Some(StageHandle::new_stoppable(request))
                    }) as StageFactory
                })
                .collect();

            let pipeline_ptr = proc.spawn(Pipeline::new(proc_for_pipeline, stages));
            bridge(&shared, &pipeline_ptr, || ());
            Some(StageHandle::new_stoppable(pipeline_ptr))
        }));

        ptr
    }

    /// Opens a protocol-specific connection over the modem; on success,
    /// allocates and returns the next `ConnectionIndex`.
    pub fn open_network(&self, protocol: Protocol, host: &str, port: u16) -> ActionPtr<ValueAction<ConnectionIndex>> {
        let (action, shared) = ValueAction::new_pending();
        let ptr = self.processor.spawn(action);

        let support = self.support.clone();
        let commands = self.commands.clone();
        let connections = self.connections.clone();
        let retry = self.retry;
        let host_owned = host.to_string();

        self.operation_queue.push(Box::new(move |proc: &ActionProcessor| {
            #[cfg(feature = "log")]
            log::debug!("modem: opening {protocol:?} connection to {host_owned}:{port}");
            let cmd = commands.open_socket_command(protocol, &host_owned, port);
            let request = ok_request(&support, proc, cmd, Duration::from_secs(10), retry);

            let connections2 = connections.clone();
            let host2 = host_owned.clone();
            bridge(&shared, &request, move || {
                connections2.borrow_mut().insert(Connection {
                    protocol,
                    host: host2,
                    port,
                })
            });
            Some(StageHandle::new_stoppable(request))
        }));

        ptr
    }

    /// Closes a connection and frees its slot.
    pub fn close_network(&self, index: ConnectionIndex) -> ActionPtr<ValueAction<()>> {
        let (action, shared) = ValueAction::new_pending();
        let ptr = self.processor.spawn(action);

        let support = self.support.clone();
        let commands = self.commands.clone();
        let connections = self.connections.clone();
        let retry = self.retry;

        self.operation_queue.push(Box::new(move |proc: &ActionProcessor| {
            #[cfg(feature = "log")]
            log::debug!("modem: closing connection {index:?}");
            let cmd = commands.close_socket_command(index);
            let request = ok_request(&support, proc, cmd, Duration::from_secs(10), retry);

            let connections2 = connections.clone();
            bridge(&shared, &request, move || {
                connections2.borrow_mut().remove(index);
            });
            Some(StageHandle::new_stoppable(request))
        }));

        ptr
    }

    /// Sends `data` over `index`. Oversized writes (beyond the command
    /// set's MTU) are rejected as `Error` without ever touching the wire.
    pub fn write_packet(&self, index: ConnectionIndex, data: DataBuffer) -> ActionPtr<ValueAction<()>> {
        let (action, shared) = ValueAction::new_pending();
        let ptr = self.processor.spawn(action);

        let mtu = self.commands.mtu();
        if data.len() > mtu {
            *shared.outcome.borrow_mut() = Some(PendingOutcome::Error(LinkError::OversizedPacket {
                size: data.len(),
                mtu,
            }));
            return ptr;
        }

        let support = self.support.clone();
        let commands = self.commands.clone();
        let retry = self.retry;

        self.operation_queue.push(Box::new(move |proc: &ActionProcessor| {
            #[cfg(feature = "log")]
            log::trace!("modem: writing {} bytes to connection {index:?}", data.len());
            let cmd = commands.write_packet_command(index, data.len());
            let dispatcher = support.dispatcher();
            let support2 = support.clone();
            let proc2 = proc.clone();
            let payload = data.clone();
            let request = proc.spawn(AtRequest::new(
                dispatcher,
                move || {
                    let write_ptr = support2.make_request(&proc2, &cmd);
                    // Real vendor sets gate the payload behind a `"> "`
                    // prompt; the generic illustrative command set assumes
                    // the modem accepts it immediately after the command.
                    support2.write_raw(&payload);
                    write_ptr
                },
                vec![Wait::new("OK", Duration::from_secs(10))],
                retry,
            ));
            bridge(&shared, &request, || ());
            Some(StageHandle::new_stoppable(request))
        }));

        ptr
    }

    /// Queries pending bytes for `index`, then reads them. An empty pending
    /// count resolves immediately with an empty buffer without issuing the
    /// read command.
    pub fn read_packet(&self, index: ConnectionIndex, timeout: Duration) -> ActionPtr<ValueAction<DataBuffer>> {
        let (action, shared) = ValueAction::new_pending();
        let ptr = self.processor.spawn(action);

        let support = self.support.clone();
        let commands = self.commands.clone();
        let retry = self.retry;

        self.operation_queue.push(Box::new(move |proc: &ActionProcessor| {
            #[cfg(feature = "log")]
            log::trace!("modem: querying pending bytes for connection {index:?}");
            let query_cmd = commands.read_pending_command(index);
            let pending_prefix = commands.read_pending_prefix();
            let pending_count = Rc::new(Cell::new(0i64));
            let pending_count2 = pending_count.clone();

            let dispatcher = support.dispatcher();
            let support_q = support.clone();
            let proc_q = proc.clone();
            let query_request = proc.spawn(AtRequest::new(
                dispatcher,
                move || support_q.make_request(&proc_q, &query_cmd),
                vec![Wait::new(pending_prefix, timeout).with_handler(move |buf, line| {
                    match buf.line(line).and_then(|l| parse_field_i64(l, 0)) {
                        Some(n) => {
                            pending_count2.set(n);
                            true
                        }
                        None => false,
                    }
                })],
                retry,
            ));

            let support_r = support.clone();
            let commands_r = commands.clone();
            let shared2 = shared.clone();
            let proc_for_read = proc.clone();
            let sub = query_request.on_status(move |status| {
                match status {
                    Status::Result => {
                        let count = pending_count.get();
                        if count <= 0 {
                            let mut outcome = shared2.outcome.borrow_mut();
                            *outcome = Some(PendingOutcome::Result(DataBuffer::new()));
                            return;
                        }
                        start_read(&support_r, &commands_r, &proc_for_read, index, count as usize, timeout, retry, &shared2);
                    }
                    Status::Error(e) => {
                        *shared2.outcome.borrow_mut() = Some(PendingOutcome::Error(LinkError::RecvFailed(e.to_string())));
                    }
                    Status::Stop => {
                        *shared2.outcome.borrow_mut() = Some(PendingOutcome::Stop);
                    }
                }
            });
            *shared.sub.borrow_mut() = Some(sub);

            Some(StageHandle::new_stoppable(query_request))
        }));

        ptr
    }

    pub fn set_power_save_param(&self, param: &str) -> ActionPtr<ValueAction<()>> {
        let (action, shared) = ValueAction::new_pending();
        let ptr = self.processor.spawn(action);

        let support = self.support.clone();
        let commands = self.commands.clone();
        let retry = self.retry;
        let param = param.to_string();

        self.operation_queue.push(Box::new(move |proc: &ActionProcessor| {
            let cmd = commands.power_save_command(&param);
            let request = ok_request(&support, proc, cmd, Duration::from_secs(5), retry);
            bridge(&shared, &request, || ());
            Some(StageHandle::new_stoppable(request))
        }));

        ptr
    }

    pub fn power_off(&self) -> ActionPtr<ValueAction<()>> {
        let (action, shared) = ValueAction::new_pending();
        let ptr = self.processor.spawn(action);

        let support = self.support.clone();
        let commands = self.commands.clone();
        let retry = self.retry;

        self.operation_queue.push(Box::new(move |proc: &ActionProcessor| {
            let cmd = commands.power_off_command();
            let request = ok_request(&support, proc, cmd, Duration::from_secs(5), retry);
            bridge(&shared, &request, || ());
            Some(StageHandle::new_stoppable(request))
        }));

        ptr
    }
}

fn start_read<P: SerialPort + 'static, C: ModemCommandSet + 'static>(
    support: &Rc<AtSupport<P>>,
    commands: &Rc<C>,
    processor: &ActionProcessor,
    index: ConnectionIndex,
    max_len: usize,
    timeout: Duration,
    retry: RetryPolicy,
    shared: &Rc<ValueShared<DataBuffer>>,
) {
    #[cfg(feature = "log")]
    log::trace!("modem: reading {max_len} pending bytes from connection {index:?}");
    let read_cmd = commands.read_command(index, max_len);
    let read_prefix = commands.read_prefix();
    let payload: Rc<RefCell<DataBuffer>> = Rc::new(RefCell::new(DataBuffer::new()));
    let payload2 = payload.clone();

    let dispatcher = support.dispatcher();
    let support2 = support.clone();
    let processor2 = processor.clone();
    let read_request = processor.spawn(AtRequest::new(
        dispatcher,
        move || support2.make_request(&processor2, &read_cmd),
        vec![Wait::new(read_prefix, timeout).with_handler(move |buf, line| match buf.line(line) {
            Some(l) => {
                let bytes = l.split_once(": ").map(|(_, rest)| rest).unwrap_or(l);
                *payload2.borrow_mut() = DataBuffer::from(bytes.as_bytes());
                true
            }
            None => false,
        })],
        retry,
    ));

    bridge(shared, &read_request, move || payload.borrow().clone());
}
