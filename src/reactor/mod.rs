// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The reactor is the runtime of the library: a pool of workers, each running
//! an event loop over a poller, a timer set and a cross-thread request
//! channel. Every socket is pinned to one worker; all its protocol and
//! transport state machines run there, serialised by construction.

pub mod dispatcher;
pub mod timer;

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::Arc;
use std::sync::mpsc;

use crate::core::socket;
use crate::global::{Domain, EndpointId, IdSequence, SocketId, SocketType};
use crate::io_error::terminated_io_error;
use crate::transport::{acceptor, inproc, pipe};

pub use self::timer::{Scheduled, TimerSet};

/// Requests flowing from the facade (and from peer workers) to a worker.
pub enum Request {
    Session(SessionRequest),
    Socket(SocketId, socket::Request),
    Endpoint(SocketId, EndpointId, EndpointRequest)
}

impl Request {
    pub fn name(&self) -> &'static str {
        match *self {
            Request::Session(_) => "Session",
            Request::Socket(_, _) => "Socket",
            Request::Endpoint(_, _, _) => "Endpoint"
        }
    }
}

/// Worker-level requests.
pub enum SessionRequest {
    CreateSocket(SocketId, SocketType, Domain, mpsc::Sender<socket::Reply>),
    InprocAttach(InprocAttach),
    Shutdown
}

impl SessionRequest {
    pub fn name(&self) -> &'static str {
        match *self {
            SessionRequest::CreateSocket(_, _, _, _) => "CreateSocket",
            SessionRequest::InprocAttach(_) => "InprocAttach",
            SessionRequest::Shutdown => "Shutdown"
        }
    }
}

/// One end of an in-process connection being handed to a socket.
/// `eid` is set when the receiving worker already allocated an endpoint id
/// for it (a parked connector); otherwise the worker allocates one.
pub struct InprocAttach {
    pub sid: SocketId,
    pub eid: Option<EndpointId>,
    pub channel: Arc<inproc::InprocChannel>,
    pub side: inproc::Side
}

/// Requests targeted at a single endpoint of a socket.
pub enum EndpointRequest {
    Close,
    /// Synthesised readiness, used by transports that have no descriptor
    /// to poll (in-process pipes woken by their peer's worker).
    Ready(mio::Ready)
}

impl EndpointRequest {
    pub fn name(&self) -> &'static str {
        match *self {
            EndpointRequest::Close => "Close",
            EndpointRequest::Ready(_) => "Ready"
        }
    }
}

/// Timer payloads. Each names the state machine the expiration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Reconnect(SocketId, EndpointId),
    Rebind(SocketId, EndpointId),
    CancelSend(SocketId),
    CancelRecv(SocketId),
    Resend(SocketId),
    SurveyDeadline(SocketId),
    EndpointTimeout(SocketId, EndpointId),
    Linger(SocketId)
}

/// Events raised by transport state machines while a worker runs a handler.
/// They are queued and drained FIFO before the worker goes back to polling,
/// so an event raised to self is processed in the same scheduling round.
pub enum Signal {
    Pipe(SocketId, EndpointId, pipe::Event),
    Acceptor(SocketId, EndpointId, acceptor::Event)
}

/// Sending half of a worker's request channel, paired with the poll
/// registration that wakes the worker out of its poller.
#[derive(Clone, Debug)]
pub struct WorkerSender {
    tx: mpsc::Sender<Request>,
    awakener: mio::SetReadiness
}

impl WorkerSender {
    pub fn new(tx: mpsc::Sender<Request>, awakener: mio::SetReadiness) -> WorkerSender {
        WorkerSender { tx, awakener }
    }

    pub fn send(&self, request: Request) -> io::Result<()> {
        self.tx.send(request).map_err(|_| terminated_io_error())?;
        self.awakener.set_readiness(mio::Ready::readable())
    }
}

/// Poll token reserved for the request-channel awakener.
pub const CHANNEL_TOKEN: mio::Token = mio::Token(0);

/// Per-worker mutable state shared by every handler the worker dispatches:
/// the poller, the timer set, the raised-signal queue, and the routing and
/// naming tables.
pub struct Context {
    pub poll: mio::Poll,
    pub timers: TimerSet,
    pub signals: VecDeque<Signal>,
    pub touched: HashSet<SocketId>,
    pub owners: HashMap<mio::Token, SocketId>,
    pub seq: IdSequence,
    pub worker_index: usize,
    pub senders: Vec<WorkerSender>,
    pub registry: inproc::Registry
}

impl Context {
    pub fn new(worker_index: usize,
               senders: Vec<WorkerSender>,
               registry: inproc::Registry) -> io::Result<Context> {
        let seq = IdSequence::new();

        seq.next(); // consume the channel token

        Ok(Context {
            poll: mio::Poll::new()?,
            timers: TimerSet::new(),
            signals: VecDeque::new(),
            touched: HashSet::new(),
            owners: HashMap::new(),
            seq,
            worker_index,
            senders,
            registry
        })
    }

    pub fn next_eid(&mut self) -> EndpointId {
        EndpointId(self.seq.next())
    }

    pub fn raise(&mut self, signal: Signal) {
        let sid = match signal {
            Signal::Pipe(sid, _, _) => sid,
            Signal::Acceptor(sid, _, _) => sid
        };

        self.touched.insert(sid);
        self.signals.push_back(signal);
    }

    pub fn sender_to(&self, worker_index: usize) -> WorkerSender {
        self.senders[worker_index].clone()
    }

    pub fn own_sender(&self) -> WorkerSender {
        self.sender_to(self.worker_index)
    }
}
