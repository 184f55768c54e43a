// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::collections::HashMap;
use std::io;
use std::sync::mpsc::Sender;

use log::{debug, error};

use crate::global::{Domain, EndpointId, SocketId, SocketType};
use crate::io_error::{terminated_io_error, would_block_io_error};
use crate::message::Message;
use crate::proto::{self, Protocol};
use crate::reactor::InprocAttach;
use crate::transport::{self, inproc, pipe};
use crate::util::backoff::Backoff;
use crate::util::signal::SignalFd;

use super::config::{Config, OptionKind, OptionValue, SocketOption};
use super::context::Scope;
use super::endpoint::{Acceptor, EndpointKind, EndpointSpec, Pipe};

/// Commands a facade socket posts to its worker.
pub enum Request {
    Connect(String),
    Bind(String),
    Send(Message, bool),
    Recv(bool),
    SetOption(SocketOption),
    GetOption(OptionKind),
    Close
}

impl Request {
    pub fn name(&self) -> &'static str {
        match *self {
            Request::Connect(_) => "Connect",
            Request::Bind(_) => "Bind",
            Request::Send(_, _) => "Send",
            Request::Recv(_) => "Recv",
            Request::SetOption(_) => "SetOption",
            Request::GetOption(_) => "GetOption",
            Request::Close => "Close"
        }
    }
}

/// Replies the worker sends back to the facade socket.
pub enum Reply {
    SocketCreated,
    SocketNotCreated(io::Error),
    Connected(EndpointId),
    NotConnected(io::Error),
    Bound(EndpointId),
    NotBound(io::Error),
    MsgSent,
    MsgNotSent(io::Error),
    MsgRecv(Message),
    MsgNotRecv(io::Error),
    OptionSet,
    OptionNotSet(io::Error),
    OptionRetrieved(OptionValue),
    OptionNotRetrieved(io::Error),
    Closed
}

enum State {
    Active,
    Closing,
    Done
}

/// A socket as the worker sees it: one protocol instance, the endpoints,
/// the option store and the readiness notification descriptors.
pub struct Socket {
    id: SocketId,
    socket_type: SocketType,
    domain: Domain,
    protocol: Box<dyn Protocol>,
    reply_tx: Sender<Reply>,
    config: Config,
    endpoints: HashMap<EndpointId, EndpointSpec>,
    acceptors: HashMap<EndpointId, Acceptor>,
    send_sig: SignalFd,
    recv_sig: SignalFd,
    state: State
}

impl Socket {
    pub fn new(id: SocketId,
               socket_type: SocketType,
               domain: Domain,
               reply_tx: Sender<Reply>) -> io::Result<Socket> {
        Ok(Socket {
            id,
            socket_type,
            domain,
            protocol: proto::create_protocol(socket_type, domain, reply_tx.clone()),
            reply_tx,
            config: Config::default(),
            endpoints: HashMap::new(),
            acceptors: HashMap::new(),
            send_sig: SignalFd::new()?,
            recv_sig: SignalFd::new()?,
            state: State::Active
        })
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    fn notify(&self, reply: Reply) {
        if self.reply_tx.send(reply).is_err() {
            error!("[{:?}] failed to notify the facade: channel closed", self.id);
        }
    }

    pub fn process(&mut self, scope: &mut Scope, request: Request) {
        debug!("[{:?}] processing request '{}'", self.id, request.name());

        if !matches!(self.state, State::Active) {
            self.refuse(request);
            return;
        }

        match request {
            Request::Connect(url) => self.connect(scope, url),
            Request::Bind(url) => self.bind(scope, url),
            Request::Send(msg, nonblocking) => self.send(scope, msg, nonblocking),
            Request::Recv(nonblocking) => self.recv(scope, nonblocking),
            Request::SetOption(option) => self.set_option(option),
            Request::GetOption(kind) => self.get_option(kind),
            Request::Close => self.close(scope)
        }
    }

    fn refuse(&mut self, request: Request) {
        match request {
            Request::Connect(_) => self.notify(Reply::NotConnected(terminated_io_error())),
            Request::Bind(_) => self.notify(Reply::NotBound(terminated_io_error())),
            Request::Send(_, _) => self.notify(Reply::MsgNotSent(terminated_io_error())),
            Request::Recv(_) => self.notify(Reply::MsgNotRecv(terminated_io_error())),
            Request::SetOption(_) => self.notify(Reply::OptionNotSet(terminated_io_error())),
            Request::GetOption(_) => self.notify(Reply::OptionNotRetrieved(terminated_io_error())),
            Request::Close => {}
        }
    }

    /*****************************************************************/
    /*  endpoint creation                                            */
    /*****************************************************************/

    fn connect(&mut self, scope: &mut Scope, url: String) {
        match self.start_connect(scope, &url) {
            Ok(eid) => {
                debug!("[{:?}] pipe [{:?}] connect: '{}'", self.id, eid, url);
                self.notify(Reply::Connected(eid));
            }
            Err(e) => self.notify(Reply::NotConnected(e))
        }
    }

    fn start_connect(&mut self, scope: &mut Scope, url: &str) -> io::Result<EndpointId> {
        let (scheme, addr) = transport::split_url(url)?;
        let eid = scope.next_eid();

        self.do_connect(scope, eid, scheme, addr)?;
        self.endpoints.insert(eid, EndpointSpec {
            url: url.to_owned(),
            kind: EndpointKind::Connect,
            backoff: Backoff::new(self.config.reconnect_ivl, self.config.reconnect_ivl_max)
        });
        Ok(eid)
    }

    fn do_connect(&mut self, scope: &mut Scope, eid: EndpointId, scheme: &str, addr: &str) -> io::Result<()> {
        if scheme == "inproc" {
            let party = self.inproc_party(scope);

            if let Some(channel) = inproc::connect(&scope.registry(), addr, eid, party)? {
                self.attach_inproc(scope, eid, channel, inproc::Side::Connector);
            }
            return Ok(());
        }

        let transport = transport::create_transport(scheme)?;
        let dest = self.config.destination(addr, self.pids());
        let tpipe = transport.connect(&dest)?;

        self.attach_pipe(scope, eid, tpipe);
        Ok(())
    }

    fn bind(&mut self, scope: &mut Scope, url: String) {
        match self.start_bind(scope, &url) {
            Ok(eid) => {
                debug!("[{:?}] acceptor [{:?}] bind: '{}'", self.id, eid, url);
                self.notify(Reply::Bound(eid));
            }
            Err(e) => self.notify(Reply::NotBound(e))
        }
    }

    fn start_bind(&mut self, scope: &mut Scope, url: &str) -> io::Result<EndpointId> {
        let (scheme, addr) = transport::split_url(url)?;
        let eid = scope.next_eid();

        self.do_bind(scope, eid, scheme, addr)?;
        self.endpoints.insert(eid, EndpointSpec {
            url: url.to_owned(),
            kind: EndpointKind::Bind,
            backoff: Backoff::new(self.config.reconnect_ivl, self.config.reconnect_ivl_max)
        });
        Ok(eid)
    }

    fn do_bind(&mut self, scope: &mut Scope, eid: EndpointId, scheme: &str, addr: &str) -> io::Result<()> {
        if scheme == "inproc" {
            let joined = inproc::bind(&scope.registry(), addr, self.inproc_party(scope))?;

            for channel in joined {
                let ceid = scope.next_eid();
                self.attach_inproc(scope, ceid, channel, inproc::Side::Binder);
            }
            return Ok(());
        }

        let transport = transport::create_transport(scheme)?;
        let dest = self.config.destination(addr, self.pids());
        let inner = transport.bind(&dest)?;
        let mut acceptor = Acceptor::new(eid, inner);

        scope.register_owner(eid);
        acceptor.open(scope);
        self.acceptors.insert(eid, acceptor);
        Ok(())
    }

    fn pids(&self) -> (u16, u16) {
        (self.protocol.id(), self.protocol.peer_id())
    }

    fn inproc_party(&self, scope: &Scope) -> inproc::Party {
        inproc::Party {
            sid: self.id,
            proto_ids: self.pids(),
            rcvbuf: self.config.recv_buffer,
            worker: scope.own_sender()
        }
    }

    fn attach_pipe(&mut self, scope: &mut Scope, eid: EndpointId, tpipe: Box<dyn pipe::Pipe>) {
        let pipe = Pipe::new(eid, tpipe, self.config.send_priority, self.config.recv_priority);

        scope.register_owner(eid);
        match self.protocol.add_pipe(scope, pipe) {
            Ok(()) => self.protocol.open_pipe(scope, eid),
            Err(e) => {
                debug!("[{:?}] pipe [{:?}] refused by the protocol: '{}'", self.id, eid, e);
                scope.forget_owner(eid);
            }
        }
    }

    fn attach_inproc(&mut self,
                     scope: &mut Scope,
                     eid: EndpointId,
                     channel: std::sync::Arc<inproc::InprocChannel>,
                     side: inproc::Side) {
        let me = inproc::PeerHandle {
            worker: scope.own_sender(),
            sid: self.id,
            eid
        };
        let tpipe = Box::new(inproc::InprocPipe::new(channel.clone(), side, me));
        let pipe = Pipe::new(eid, tpipe, self.config.send_priority, self.config.recv_priority);

        match self.protocol.add_pipe(scope, pipe) {
            Ok(()) => self.protocol.open_pipe(scope, eid),
            Err(e) => {
                debug!("[{:?}] inproc pipe [{:?}] refused by the protocol: '{}'", self.id, eid, e);
                channel.close_all_and_wake();
            }
        }
    }

    /// One end of an in-process connection handed over by the registry.
    pub fn attach_inproc_endpoint(&mut self, scope: &mut Scope, attach: InprocAttach) {
        if !matches!(self.state, State::Active) {
            attach.channel.close_all_and_wake();
            return;
        }

        let eid = match attach.eid {
            Some(eid) => eid,
            None => scope.next_eid()
        };

        debug!("[{:?}] inproc pipe [{:?}] attached", self.id, eid);
        self.attach_inproc(scope, eid, attach.channel, attach.side);
    }

    /*****************************************************************/
    /*  endpoint lifecycle                                           */
    /*****************************************************************/

    pub fn reconnect(&mut self, scope: &mut Scope, eid: EndpointId) {
        if !matches!(self.state, State::Active) {
            return;
        }
        let url = match self.endpoints.get(&eid) {
            Some(spec) => spec.url.clone(),
            None => return
        };

        debug!("[{:?}] pipe [{:?}] reconnect: '{}'", self.id, eid, url);

        let res = transport::split_url(&url)
            .and_then(|(scheme, addr)| self.do_connect(scope, eid, scheme, addr));

        if let Err(e) = res {
            self.schedule_reconnect(scope, eid, e);
        }
    }

    pub fn rebind(&mut self, scope: &mut Scope, eid: EndpointId) {
        if !matches!(self.state, State::Active) || self.acceptors.contains_key(&eid) {
            return;
        }
        let url = match self.endpoints.get(&eid) {
            Some(spec) => spec.url.clone(),
            None => return
        };

        debug!("[{:?}] acceptor [{:?}] rebind: '{}'", self.id, eid, url);

        let res = transport::split_url(&url)
            .and_then(|(scheme, addr)| self.do_bind(scope, eid, scheme, addr));

        if let Err(e) = res {
            self.schedule_rebind(scope, eid, e);
        }
    }

    fn schedule_reconnect(&mut self, scope: &mut Scope, eid: EndpointId, err: io::Error) {
        if let Some(spec) = self.endpoints.get_mut(&eid) {
            let delay = spec.backoff.next();

            debug!("[{:?}] pipe [{:?}] retrying in {:?} after: '{:?}'", self.id, eid, delay, err);
            let _ = scope.schedule_reconnect(eid, delay)
                .map_err(|e| error!("[{:?}] pipe [{:?}] reconnect timeout failed: '{:?}'", self.id, eid, e));
        }
    }

    fn schedule_rebind(&mut self, scope: &mut Scope, eid: EndpointId, err: io::Error) {
        if let Some(spec) = self.endpoints.get_mut(&eid) {
            let delay = spec.backoff.next();

            debug!("[{:?}] acceptor [{:?}] retrying in {:?} after: '{:?}'", self.id, eid, delay, err);
            let _ = scope.schedule_rebind(eid, delay)
                .map_err(|e| error!("[{:?}] acceptor [{:?}] rebind timeout failed: '{:?}'", self.id, eid, e));
        }
    }

    /// Stops one endpoint, the facade's `Endpoint::shutdown`.
    pub fn close_endpoint(&mut self, scope: &mut Scope, eid: EndpointId) {
        debug!("[{:?}] endpoint [{:?}] shutdown", self.id, eid);

        let spec = self.endpoints.remove(&eid);

        if let Some(mut acceptor) = self.acceptors.remove(&eid) {
            acceptor.close(scope);
            scope.forget_owner(eid);
        } else if let Some(mut pipe) = self.protocol.remove_pipe(scope, eid) {
            pipe.close(scope);
            scope.forget_owner(eid);
        }

        if let Some(spec) = spec {
            self.forget_inproc_endpoint(scope, eid, &spec);
        }
    }

    fn forget_inproc_endpoint(&mut self, scope: &mut Scope, eid: EndpointId, spec: &EndpointSpec) {
        if let Ok(("inproc", name)) = transport::split_url(&spec.url) {
            match spec.kind {
                EndpointKind::Bind => inproc::unbind(&scope.registry(), name, self.id),
                EndpointKind::Connect => inproc::unpark(&scope.registry(), self.id, eid)
            }
        }
    }

    /*****************************************************************/
    /*  events                                                       */
    /*****************************************************************/

    pub fn on_endpoint_ready(&mut self, scope: &mut Scope, eid: EndpointId, events: mio::Ready) {
        if let Some(acceptor) = self.acceptors.get_mut(&eid) {
            acceptor.ready(scope, events);
        } else {
            self.protocol.ready(scope, eid, events);
        }
    }

    pub fn on_endpoint_timeout(&mut self, scope: &mut Scope, eid: EndpointId) {
        if !self.acceptors.contains_key(&eid) {
            self.protocol.on_pipe_timeout(scope, eid);
        }
    }

    pub fn on_pipe_event(&mut self, scope: &mut Scope, eid: EndpointId, evt: pipe::Event) {
        debug!("[{:?}] pipe [{:?}] event: '{}'", self.id, eid, evt.name());

        match evt {
            pipe::Event::Opened => {
                if let Some(spec) = self.endpoints.get_mut(&eid) {
                    spec.backoff.reset();
                }
                self.protocol.on_pipe_opened(scope, eid);
            }
            pipe::Event::CanSend => self.protocol.on_pipe_can_send(scope, eid),
            pipe::Event::Sent => self.protocol.on_send_done(scope, eid),
            pipe::Event::Received(msg) => self.protocol.on_recv_done(scope, eid, msg),
            pipe::Event::Error(e) => self.on_pipe_error(scope, eid, e)
        }
    }

    fn on_pipe_error(&mut self, scope: &mut Scope, eid: EndpointId, err: io::Error) {
        debug!("[{:?}] pipe [{:?}] error: '{:?}'", self.id, eid, err);

        if let Some(mut pipe) = self.protocol.remove_pipe(scope, eid) {
            pipe.close(scope);
        }
        scope.forget_owner(eid);

        let reconnectable = matches!(self.state, State::Active)
            && self.endpoints.get(&eid).map(|s| s.kind) == Some(EndpointKind::Connect);

        if reconnectable {
            self.schedule_reconnect(scope, eid, err);
        }
    }

    pub fn on_acceptor_event(&mut self, scope: &mut Scope, eid: EndpointId, evt: transport::acceptor::Event) {
        debug!("[{:?}] acceptor [{:?}] event: '{}'", self.id, eid, evt.name());

        match evt {
            transport::acceptor::Event::Accepted(tpipes) => {
                for tpipe in tpipes {
                    let ceid = scope.next_eid();

                    debug!("[{:?}] acceptor [{:?}] accepted pipe [{:?}]", self.id, eid, ceid);
                    self.attach_pipe(scope, ceid, tpipe);
                }
            }
            transport::acceptor::Event::Error(e) => self.on_acceptor_error(scope, eid, e)
        }
    }

    fn on_acceptor_error(&mut self, scope: &mut Scope, eid: EndpointId, err: io::Error) {
        debug!("[{:?}] acceptor [{:?}] error: '{:?}'", self.id, eid, err);

        if let Some(mut acceptor) = self.acceptors.remove(&eid) {
            acceptor.close(scope);
        }
        scope.forget_owner(eid);

        if matches!(self.state, State::Active) && self.endpoints.contains_key(&eid) {
            self.schedule_rebind(scope, eid, err);
        }
    }

    /*****************************************************************/
    /*  user operations                                              */
    /*****************************************************************/

    fn send(&mut self, scope: &mut Scope, msg: Message, nonblocking: bool) {
        debug!("[{:?}] send", self.id);

        if nonblocking && !self.protocol.ready_to_send() {
            self.notify(Reply::MsgNotSent(would_block_io_error("send would block")));
            return;
        }

        let timeout = match self.config.send_timeout {
            Some(delay) => scope.schedule_cancel_send(delay).ok(),
            None => None
        };

        self.protocol.send(scope, msg, timeout);
    }

    pub fn on_send_timeout(&mut self, scope: &mut Scope) {
        debug!("[{:?}] on_send_timeout", self.id);
        self.protocol.on_send_timeout(scope);
    }

    fn recv(&mut self, scope: &mut Scope, nonblocking: bool) {
        debug!("[{:?}] recv", self.id);

        if nonblocking && !self.protocol.ready_to_recv() {
            self.notify(Reply::MsgNotRecv(would_block_io_error("recv would block")));
            return;
        }

        let timeout = match self.config.recv_timeout {
            Some(delay) => scope.schedule_cancel_recv(delay).ok(),
            None => None
        };

        self.protocol.recv(scope, timeout);
    }

    pub fn on_recv_timeout(&mut self, scope: &mut Scope) {
        debug!("[{:?}] on_recv_timeout", self.id);
        self.protocol.on_recv_timeout(scope);
    }

    pub fn on_resend_timer(&mut self, scope: &mut Scope) {
        self.protocol.on_resend_timer(scope);
    }

    pub fn on_survey_deadline(&mut self, scope: &mut Scope) {
        self.protocol.on_survey_deadline(scope);
    }

    /*****************************************************************/
    /*  options                                                      */
    /*****************************************************************/

    fn set_option(&mut self, option: SocketOption) {
        debug!("[{:?}] set option '{}'", self.id, option.name());

        let result = match self.config.set(&option) {
            Ok(true) => Ok(()),
            Ok(false) => self.protocol.set_option(&option),
            Err(e) => Err(e)
        };

        match result {
            Ok(()) => self.notify(Reply::OptionSet),
            Err(e) => self.notify(Reply::OptionNotSet(e))
        }
    }

    fn get_option(&mut self, kind: OptionKind) {
        let value = match kind {
            OptionKind::Domain => OptionValue::Domain(self.domain),
            OptionKind::Protocol => OptionValue::Protocol(self.socket_type),
            OptionKind::SendFd => OptionValue::Fd(self.send_sig.as_raw_fd()),
            OptionKind::RecvFd => OptionValue::Fd(self.recv_sig.as_raw_fd()),
            other => match self.config.get(other) {
                Some(value) => value,
                None => unreachable!("socket-level option kinds are handled above")
            }
        };

        self.notify(Reply::OptionRetrieved(value));
    }

    /*****************************************************************/
    /*  shutdown                                                     */
    /*****************************************************************/

    fn close(&mut self, scope: &mut Scope) {
        debug!("[{:?}] close", self.id);

        self.protocol.abort_pending(scope);
        self.stop_endpoints(scope);

        if !self.protocol.has_pending_send() {
            self.finalize(scope);
            return;
        }

        // drain what the pipes still hold, up to the linger bound
        match self.config.linger {
            Some(delay) if delay.is_zero() => self.finalize(scope),
            Some(delay) => {
                let _ = scope.schedule_linger(delay)
                    .map_err(|e| error!("[{:?}] linger timeout failed: '{:?}'", self.id, e));
                self.state = State::Closing;
            }
            None => self.state = State::Closing
        }
    }

    /// Library shutdown: no linger, waiters are woken with the
    /// terminated error.
    pub fn terminate(&mut self, scope: &mut Scope) {
        debug!("[{:?}] terminate", self.id);

        if matches!(self.state, State::Done) {
            return;
        }
        self.protocol.abort_pending(scope);
        self.stop_endpoints(scope);
        self.finalize(scope);
    }

    fn stop_endpoints(&mut self, scope: &mut Scope) {
        for (eid, mut acceptor) in self.acceptors.drain().collect::<Vec<_>>() {
            acceptor.close(scope);
            scope.forget_owner(eid);
        }
        inproc::forget_socket(&scope.registry(), self.id);
        self.endpoints.clear();
    }

    fn finalize(&mut self, scope: &mut Scope) {
        if matches!(self.state, State::Done) {
            return;
        }

        for mut pipe in self.protocol.destroy(scope) {
            scope.forget_owner(pipe.eid());
            pipe.close(scope);
        }

        self.state = State::Done;
        self.notify(Reply::Closed);
    }

    pub fn on_linger_timeout(&mut self, scope: &mut Scope) {
        if matches!(self.state, State::Closing) {
            debug!("[{:?}] linger expired, dropping undelivered data", self.id);
            self.finalize(scope);
        }
    }

    /// End-of-round maintenance: progress a lingering close and refresh the
    /// notification descriptors against the protocol's readiness.
    pub fn maintain(&mut self, scope: &mut Scope) {
        match self.state {
            State::Active => {
                let send_ready = self.protocol.ready_to_send();
                let recv_ready = self.protocol.ready_to_recv();

                self.send_sig.update(send_ready);
                self.recv_sig.update(recv_ready);
            }
            State::Closing => {
                if !self.protocol.has_pending_send() {
                    self.finalize(scope);
                }
            }
            State::Done => {}
        }
    }
}
