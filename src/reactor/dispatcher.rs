// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::collections::HashMap;
use std::io;
use std::sync::mpsc;
use std::time::Instant;

use log::{debug, error};

use crate::core::context::Scope;
use crate::core::socket::Socket;
use crate::global::{EndpointId, SocketId};
use crate::transport::inproc;

use super::{
    Context, EndpointRequest, Request, SessionRequest, Signal, Task, WorkerSender,
    CHANNEL_TOKEN,
};

/// One worker: an event loop multiplexing OS readiness, timers and the
/// request channel over the sockets pinned to it.
///
/// Loop order per round: poll, drain the request channel, fire expired
/// timers, dispatch readiness, then drain the raised-signal queue until
/// quiescent and run maintenance on every socket that was touched.
pub struct Dispatcher {
    sockets: HashMap<SocketId, Socket>,
    ctx: Context,
    rx: mpsc::Receiver<Request>,
    awakener: mio::SetReadiness,
    _registration: mio::Registration,
    events: mio::Events,
    running: bool
}

impl Dispatcher {
    pub fn new(worker_index: usize,
               rx: mpsc::Receiver<Request>,
               registration: mio::Registration,
               senders: Vec<WorkerSender>,
               registry: inproc::Registry) -> io::Result<Dispatcher> {
        let ctx = Context::new(worker_index, senders, registry)?;
        let awakener = ctx.senders[worker_index].awakener.clone();

        ctx.poll.register(
            &registration,
            CHANNEL_TOKEN,
            mio::Ready::readable(),
            mio::PollOpt::edge())?;

        Ok(Dispatcher {
            sockets: HashMap::new(),
            ctx,
            rx,
            awakener,
            _registration: registration,
            events: mio::Events::with_capacity(1024),
            running: true
        })
    }

    pub fn run(&mut self) {
        debug!("worker {} running", self.ctx.worker_index);

        while self.running {
            let timeout = self.ctx.timers.next_timeout(Instant::now());

            match self.ctx.poll.poll(&mut self.events, timeout) {
                Ok(_) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // a broken poller cannot be recovered from
                Err(e) => panic!("poll failed: {}", e)
            }

            self.process_channel();
            self.process_timers();
            self.process_io();
            self.settle();
        }

        debug!("worker {} stopped", self.ctx.worker_index);
    }

    fn process_channel(&mut self) {
        // lower the wake flag before draining: a sender racing with the
        // drain re-raises it and the next poll returns immediately
        let _ = self.awakener.set_readiness(mio::Ready::empty());

        loop {
            match self.rx.try_recv() {
                Ok(request) => self.process_request(request),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    // every facade handle is gone
                    self.shutdown();
                    break;
                }
            }
        }
    }

    fn process_request(&mut self, request: Request) {
        debug!("worker {} request: '{}'", self.ctx.worker_index, request.name());

        match request {
            Request::Session(req) => self.process_session_request(req),
            Request::Socket(sid, req) => self.with_socket(sid, |socket, scope| {
                socket.process(scope, req)
            }),
            Request::Endpoint(sid, eid, req) => self.process_endpoint_request(sid, eid, req)
        }
    }

    fn process_session_request(&mut self, request: SessionRequest) {
        debug!("worker {} session request: '{}'", self.ctx.worker_index, request.name());

        match request {
            SessionRequest::CreateSocket(sid, socket_type, domain, reply_tx) => {
                debug!("[{:?}] creating {:?} socket ({:?})", sid, socket_type, domain);
                match Socket::new(sid, socket_type, domain, reply_tx.clone()) {
                    Ok(socket) => {
                        self.sockets.insert(sid, socket);
                        let _ = reply_tx.send(crate::core::socket::Reply::SocketCreated);
                    }
                    Err(e) => {
                        let _ = reply_tx.send(crate::core::socket::Reply::SocketNotCreated(e));
                    }
                }
            }
            SessionRequest::InprocAttach(attach) => {
                let sid = attach.sid;
                match self.sockets.get_mut(&sid) {
                    Some(socket) => {
                        let mut scope = Scope::new(&mut self.ctx, sid);
                        socket.attach_inproc_endpoint(&mut scope, attach);
                        self.ctx.touched.insert(sid);
                    }
                    None => {
                        debug!("[{:?}] inproc attach for a gone socket", sid);
                        attach.channel.close_all_and_wake();
                    }
                }
            }
            SessionRequest::Shutdown => self.shutdown()
        }
    }

    fn process_endpoint_request(&mut self, sid: SocketId, eid: EndpointId, request: EndpointRequest) {
        debug!("[{:?}] endpoint [{:?}] request: '{}'", sid, eid, request.name());

        match request {
            EndpointRequest::Close => self.with_socket(sid, |socket, scope| {
                socket.close_endpoint(scope, eid)
            }),
            EndpointRequest::Ready(events) => self.with_socket(sid, |socket, scope| {
                socket.on_endpoint_ready(scope, eid, events)
            })
        }
    }

    fn process_timers(&mut self) {
        let now = Instant::now();

        while let Some(task) = self.ctx.timers.pop_expired(now) {
            match task {
                Task::Reconnect(sid, eid) => self.with_socket(sid, |s, scope| s.reconnect(scope, eid)),
                Task::Rebind(sid, eid) => self.with_socket(sid, |s, scope| s.rebind(scope, eid)),
                Task::CancelSend(sid) => self.with_socket(sid, |s, scope| s.on_send_timeout(scope)),
                Task::CancelRecv(sid) => self.with_socket(sid, |s, scope| s.on_recv_timeout(scope)),
                Task::Resend(sid) => self.with_socket(sid, |s, scope| s.on_resend_timer(scope)),
                Task::SurveyDeadline(sid) => self.with_socket(sid, |s, scope| s.on_survey_deadline(scope)),
                Task::EndpointTimeout(sid, eid) => self.with_socket(sid, |s, scope| s.on_endpoint_timeout(scope, eid)),
                Task::Linger(sid) => self.with_socket(sid, |s, scope| s.on_linger_timeout(scope))
            }
        }
    }

    fn process_io(&mut self) {
        let ready: Vec<(mio::Token, mio::Ready)> = self.events.iter()
            .map(|e| (e.token(), e.readiness()))
            .collect();

        for (token, events) in ready {
            if token == CHANNEL_TOKEN {
                continue;
            }
            match self.ctx.owners.get(&token) {
                Some(sid) => {
                    let sid = *sid;
                    self.with_socket(sid, |socket, scope| {
                        socket.on_endpoint_ready(scope, EndpointId::from(token), events)
                    });
                }
                None => debug!("readiness for unknown token {:?}", token)
            }
        }
    }

    /// Drains raised signals to quiescence, then runs maintenance once per
    /// touched socket and sweeps the ones that finished closing.
    fn settle(&mut self) {
        loop {
            while let Some(signal) = self.ctx.signals.pop_front() {
                match signal {
                    Signal::Pipe(sid, eid, evt) => self.with_socket(sid, |s, scope| {
                        s.on_pipe_event(scope, eid, evt)
                    }),
                    Signal::Acceptor(sid, eid, evt) => self.with_socket(sid, |s, scope| {
                        s.on_acceptor_event(scope, eid, evt)
                    })
                }
            }

            if self.ctx.touched.is_empty() {
                break;
            }

            let touched: Vec<SocketId> = self.ctx.touched.drain().collect();
            for sid in touched {
                if let Some(socket) = self.sockets.get_mut(&sid) {
                    let mut scope = Scope::new(&mut self.ctx, sid);

                    socket.maintain(&mut scope);
                    if socket.is_done() {
                        self.sockets.remove(&sid);
                    }
                }
            }

            if self.ctx.signals.is_empty() {
                break;
            }
        }
    }

    fn with_socket<F>(&mut self, sid: SocketId, f: F) where F : FnOnce(&mut Socket, &mut Scope) {
        match self.sockets.get_mut(&sid) {
            Some(socket) => {
                let mut scope = Scope::new(&mut self.ctx, sid);

                f(socket, &mut scope);
                self.ctx.touched.insert(sid);
            }
            None => debug!("[{:?}] request or event for a gone socket", sid)
        }
    }

    fn shutdown(&mut self) {
        debug!("worker {} shutting down", self.ctx.worker_index);

        let sids: Vec<SocketId> = self.sockets.keys().cloned().collect();
        for sid in sids {
            self.with_socket(sid, |socket, scope| socket.terminate(scope));
        }
        self.settle();
        self.sockets.clear();
        self.running = false;
    }
}

/// Entry point of a worker thread. A failure to set the loop up is fatal
/// for the worker; the facade observes it as a closed channel.
pub fn run_worker(worker_index: usize,
                  rx: mpsc::Receiver<Request>,
                  registration: mio::Registration,
                  senders: Vec<WorkerSender>,
                  registry: inproc::Registry) {
    match Dispatcher::new(worker_index, rx, registration, senders, registry) {
        Ok(mut dispatcher) => dispatcher.run(),
        Err(e) => error!("worker {} failed to start: '{:?}'", worker_index, e)
    }
}
