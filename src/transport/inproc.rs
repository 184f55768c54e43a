// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! In-process transport. There are no descriptors: a binder registers its
//! name in a process-wide registry, a connector looks the name up and the two
//! sockets are joined by a pair of bounded message queues. A connector that
//! arrives before the binder is parked in the registry and joined when the
//! bind happens. Each queue end wakes the peer socket's worker through its
//! request channel, so the two sockets may live on different workers.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::global::{EndpointId, SocketId};
use crate::io_error::{broken_pipe_io_error, invalid_input_io_error};
use crate::message::Message;
use crate::reactor::{EndpointRequest, InprocAttach, Request, SessionRequest, WorkerSender};
use crate::transport::pipe::{Context, Event, Pipe};

pub const NAME_MAX: usize = 124;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Binder = 0,
    Connector = 1
}

impl Side {
    pub fn other(&self) -> Side {
        match *self {
            Side::Binder => Side::Connector,
            Side::Connector => Side::Binder
        }
    }
}

/// One socket's identity at a queue end, enough for the peer to wake it.
#[derive(Clone, Debug)]
pub struct PeerHandle {
    pub worker: WorkerSender,
    pub sid: SocketId,
    pub eid: EndpointId
}

#[derive(Debug)]
struct MsgQueue {
    msgs: std::collections::VecDeque<Message>,
    bytes: usize,
    capacity: usize,
    closed: bool
}

impl MsgQueue {
    fn new(capacity: usize) -> MsgQueue {
        MsgQueue {
            msgs: std::collections::VecDeque::new(),
            bytes: 0,
            capacity,
            closed: false
        }
    }

    fn has_room(&self) -> bool {
        !self.closed && self.bytes < self.capacity
    }
}

pub enum PopOutcome {
    Msg(Message),
    Empty,
    Closed
}

/// The shared state of one in-process connection: a bounded queue per
/// direction, indexed by the receiving side, plus the wake handles.
#[derive(Debug)]
pub struct InprocChannel {
    queues: [Mutex<MsgQueue>; 2],
    peers: [Mutex<Option<PeerHandle>>; 2]
}

impl InprocChannel {
    /// Queue capacities are the receive buffer budgets of the two sockets.
    pub fn new(binder_rcvbuf: usize, connector_rcvbuf: usize) -> InprocChannel {
        InprocChannel {
            queues: [
                Mutex::new(MsgQueue::new(binder_rcvbuf)),
                Mutex::new(MsgQueue::new(connector_rcvbuf))
            ],
            peers: [Mutex::new(None), Mutex::new(None)]
        }
    }

    fn queue(&self, side: Side) -> std::sync::MutexGuard<'_, MsgQueue> {
        self.queues[side as usize].lock().unwrap()
    }

    /// Pushes towards `to`; Ok(room_left) or Err when the channel is closed.
    fn push(&self, to: Side, msg: Message) -> Result<bool, Message> {
        let mut q = self.queue(to);

        if q.closed {
            return Err(msg);
        }
        q.bytes += msg.len();
        q.msgs.push_back(msg);
        Ok(q.bytes < q.capacity)
    }

    fn pop(&self, side: Side) -> PopOutcome {
        let mut q = self.queue(side);

        match q.msgs.pop_front() {
            Some(msg) => {
                q.bytes -= msg.len();
                PopOutcome::Msg(msg)
            }
            None if q.closed => PopOutcome::Closed,
            None => PopOutcome::Empty
        }
    }

    fn has_room(&self, to: Side) -> bool {
        self.queue(to).has_room()
    }

    fn set_peer(&self, side: Side, handle: PeerHandle) {
        *self.peers[side as usize].lock().unwrap() = Some(handle);
    }

    fn clear_peer(&self, side: Side) {
        *self.peers[side as usize].lock().unwrap() = None;
    }

    fn wake(&self, side: Side, readiness: mio::Ready) {
        let peer = self.peers[side as usize].lock().unwrap();

        if let Some(ref handle) = *peer {
            let _ = handle.worker.send(Request::Endpoint(
                handle.sid,
                handle.eid,
                EndpointRequest::Ready(readiness)));
        }
    }

    /// Kills both directions, waking whoever is attached. Used on pipe close
    /// and when a hand-off reaches a socket that no longer exists.
    pub fn close_all_and_wake(&self) {
        for q in &self.queues {
            q.lock().unwrap().closed = true;
        }
        let both = mio::Ready::readable() | mio::Ready::writable();
        self.wake(Side::Binder, both);
        self.wake(Side::Connector, both);
    }
}

/// A queue end presented to the protocol layer as a pipe. The message
/// hand-off is a move: the same copy semantics a wire transport would give
/// after one serialisation round, with no framing in between.
pub struct InprocPipe {
    channel: Arc<InprocChannel>,
    side: Side,
    me: PeerHandle,
    want_recv: bool
}

impl InprocPipe {
    pub fn new(channel: Arc<InprocChannel>, side: Side, me: PeerHandle) -> InprocPipe {
        InprocPipe {
            channel,
            side,
            me,
            want_recv: true
        }
    }

    fn pop_into(&mut self, ctx: &mut dyn Context) {
        match self.channel.pop(self.side) {
            PopOutcome::Msg(msg) => {
                self.want_recv = false;
                ctx.raise(Event::Received(msg));
                self.channel.wake(self.side.other(), mio::Ready::writable());
            }
            PopOutcome::Empty => self.want_recv = true,
            PopOutcome::Closed => {
                self.want_recv = false;
                ctx.raise(Event::Error(broken_pipe_io_error("peer socket closed")));
            }
        }
    }
}

impl Pipe for InprocPipe {
    fn open(&mut self, ctx: &mut dyn Context) {
        self.channel.set_peer(self.side, self.me.clone());
        ctx.raise(Event::Opened);
        if self.channel.has_room(self.side.other()) {
            ctx.raise(Event::CanSend);
        }
        self.pop_into(ctx);
    }

    fn close(&mut self, _: &mut dyn Context) {
        self.channel.clear_peer(self.side);
        self.channel.close_all_and_wake();
    }

    fn send(&mut self, ctx: &mut dyn Context, msg: Message) {
        match self.channel.push(self.side.other(), msg) {
            Ok(room) => {
                ctx.raise(Event::Sent);
                if room {
                    ctx.raise(Event::CanSend);
                }
                self.channel.wake(self.side.other(), mio::Ready::readable());
            }
            Err(_) => ctx.raise(Event::Error(broken_pipe_io_error("peer socket closed")))
        }
    }

    fn recv(&mut self, ctx: &mut dyn Context) {
        self.pop_into(ctx);
    }

    fn ready(&mut self, ctx: &mut dyn Context, events: mio::Ready) {
        if events.is_readable() && self.want_recv {
            self.pop_into(ctx);
        }
        if events.is_writable() && self.channel.has_room(self.side.other()) {
            ctx.raise(Event::CanSend);
        }
    }

    fn on_timeout(&mut self, _: &mut dyn Context) {
    }
}

/// One side of a prospective connection, as known to the registry.
#[derive(Clone)]
pub struct Party {
    pub sid: SocketId,
    pub proto_ids: (u16, u16),
    pub rcvbuf: usize,
    pub worker: WorkerSender
}

struct PendingConnector {
    name: String,
    eid: EndpointId,
    party: Party
}

pub struct RegistryInner {
    bound: HashMap<String, Party>,
    pending: Vec<PendingConnector>
}

pub type Registry = Arc<Mutex<RegistryInner>>;

pub fn new_registry() -> Registry {
    Arc::new(Mutex::new(RegistryInner {
        bound: HashMap::new(),
        pending: Vec::new()
    }))
}

fn compatible(a: (u16, u16), b: (u16, u16)) -> bool {
    a.0 == b.1 && a.1 == b.0
}

pub fn validate_name(name: &str) -> io::Result<()> {
    if name.len() > NAME_MAX {
        return Err(invalid_input_io_error("inproc name too long"));
    }
    Ok(())
}

/// Registers a binder and joins every compatible parked connector.
/// Returns the channels the binder's socket must attach on its side.
pub fn bind(registry: &Registry, name: &str, binder: Party) -> io::Result<Vec<Arc<InprocChannel>>> {
    validate_name(name)?;

    let mut inner = registry.lock().unwrap();

    if inner.bound.contains_key(name) {
        return Err(io::Error::new(io::ErrorKind::AddrInUse, "inproc name already bound"));
    }

    let mut joined = Vec::new();
    let mut parked = Vec::new();

    for pending in inner.pending.drain(..) {
        if pending.name == name && compatible(binder.proto_ids, pending.party.proto_ids) {
            let channel = Arc::new(InprocChannel::new(binder.rcvbuf, pending.party.rcvbuf));
            let attach = InprocAttach {
                sid: pending.party.sid,
                eid: Some(pending.eid),
                channel: channel.clone(),
                side: Side::Connector
            };

            debug!("inproc '{}': joining parked connector [{:?}]", name, pending.party.sid);
            if pending.party.worker.send(Request::Session(SessionRequest::InprocAttach(attach))).is_ok() {
                joined.push(channel);
            }
        } else {
            parked.push(pending);
        }
    }

    inner.pending = parked;
    inner.bound.insert(name.to_owned(), binder);

    Ok(joined)
}

/// Looks the name up; either joins with the binder right away (the returned
/// channel is the connector's side to attach) or parks the connector.
pub fn connect(registry: &Registry,
               name: &str,
               eid: EndpointId,
               connector: Party) -> io::Result<Option<Arc<InprocChannel>>> {
    validate_name(name)?;

    let mut inner = registry.lock().unwrap();

    match inner.bound.get(name) {
        Some(binder) => {
            if !compatible(binder.proto_ids, connector.proto_ids) {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "bound socket protocol does not match"));
            }

            let channel = Arc::new(InprocChannel::new(binder.rcvbuf, connector.rcvbuf));
            let attach = InprocAttach {
                sid: binder.sid,
                eid: None,
                channel: channel.clone(),
                side: Side::Binder
            };

            binder.worker.send(Request::Session(SessionRequest::InprocAttach(attach)))?;
            Ok(Some(channel))
        }
        None => {
            debug!("inproc '{}': no binder yet, parking connector [{:?}]", name, connector.sid);
            inner.pending.push(PendingConnector {
                name: name.to_owned(),
                eid,
                party: connector
            });
            Ok(None)
        }
    }
}

pub fn unbind(registry: &Registry, name: &str, sid: SocketId) {
    let mut inner = registry.lock().unwrap();

    if inner.bound.get(name).map_or(false, |b| b.sid == sid) {
        inner.bound.remove(name);
    }
}

pub fn unpark(registry: &Registry, sid: SocketId, eid: EndpointId) {
    let mut inner = registry.lock().unwrap();

    inner.pending.retain(|p| !(p.party.sid == sid && p.eid == eid));
}

/// Drops every registry trace of a closing socket.
pub fn forget_socket(registry: &Registry, sid: SocketId) {
    let mut inner = registry.lock().unwrap();

    inner.bound.retain(|_, b| b.sid != sid);
    inner.pending.retain(|p| p.party.sid != sid);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn test_party(sid: usize, proto_ids: (u16, u16)) -> (Party, mpsc::Receiver<Request>, mio::Registration) {
        let (tx, rx) = mpsc::channel();
        let (registration, set_readiness) = mio::Registration::new2();
        let party = Party {
            sid: SocketId(sid),
            proto_ids,
            rcvbuf: 1024,
            worker: WorkerSender::new(tx, set_readiness)
        };
        (party, rx, registration)
    }

    #[test]
    fn connector_before_binder_is_parked_then_joined() {
        let registry = new_registry();
        let (connector, connector_rx, _creg) = test_party(1, (16, 16));
        let (binder, _binder_rx, _breg) = test_party(2, (16, 16));

        let parked = connect(&registry, "a", EndpointId(7), connector).unwrap();
        assert!(parked.is_none());

        let joined = bind(&registry, "a", binder).unwrap();
        assert_eq!(1, joined.len());

        match connector_rx.try_recv().unwrap() {
            Request::Session(SessionRequest::InprocAttach(attach)) => {
                assert_eq!(SocketId(1), attach.sid);
                assert_eq!(Some(EndpointId(7)), attach.eid);
            }
            _ => panic!("expected an attach request")
        }
    }

    #[test]
    fn incompatible_connect_is_refused() {
        let registry = new_registry();
        let (binder, _rx, _reg1) = test_party(1, (32, 33));
        let (connector, _crx, _reg2) = test_party(2, (48, 49));

        bind(&registry, "a", binder).unwrap();
        let err = connect(&registry, "a", EndpointId(1), connector).unwrap_err();

        assert_eq!(io::ErrorKind::ConnectionRefused, err.kind());
    }

    #[test]
    fn duplicate_bind_reports_the_name_in_use() {
        let registry = new_registry();
        let (first, _rx1, _reg1) = test_party(1, (16, 16));
        let (second, _rx2, _reg2) = test_party(2, (16, 16));

        bind(&registry, "a", first).unwrap();
        let err = bind(&registry, "a", second).unwrap_err();

        assert_eq!(io::ErrorKind::AddrInUse, err.kind());
    }

    #[test]
    fn queues_hand_messages_across_and_bound_capacity() {
        let channel = InprocChannel::new(8, 8);

        assert!(channel.push(Side::Binder, Message::with_body(vec![0u8; 6])).unwrap());
        assert!(!channel.push(Side::Binder, Message::with_body(vec![0u8; 6])).unwrap());

        match channel.pop(Side::Binder) {
            PopOutcome::Msg(msg) => assert_eq!(6, msg.len()),
            _ => panic!("expected a message")
        }
    }
}
