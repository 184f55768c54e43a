// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::mpsc::Sender;

use log::debug;

use crate::core::context::Scope;
use crate::core::endpoint::Pipe;
use crate::core::socket::Reply;
use crate::global::{EndpointId, SocketType};
use crate::io_error::{other_io_error, terminated_io_error, timed_out_io_error};
use crate::message::Message;

use super::fq::FairQueue;
use super::{clear_timeout, notify, restore_backtrace, Protocol, Timeout};

/// Reply socket. Requests are fair-queued; on receive the pipe id is pushed
/// onto the backtrace and the reply is routed back by popping it. An
/// unroutable or unwritable destination drops the reply, it never blocks.
///
/// In raw mode the backtrace travels with the message so devices can forward
/// it. In cooked mode the socket keeps the backtrace of the last delivered
/// request; sending without one is a state error, receiving again abandons
/// the previous one.
pub struct Rep {
    reply_tx: Sender<Reply>,
    pipes: HashMap<EndpointId, Pipe>,
    fq: FairQueue,
    can_send: HashSet<EndpointId>,
    pending_recv: Option<Timeout>,
    raw: bool,
    backtrace: Option<Vec<u8>>
}

impl Rep {
    pub fn new(reply_tx: Sender<Reply>) -> Rep {
        Rep::with_raw(reply_tx, false)
    }

    pub fn new_raw(reply_tx: Sender<Reply>) -> Rep {
        Rep::with_raw(reply_tx, true)
    }

    fn with_raw(reply_tx: Sender<Reply>, raw: bool) -> Rep {
        Rep {
            reply_tx,
            pipes: HashMap::new(),
            fq: FairQueue::new(),
            can_send: HashSet::new(),
            pending_recv: None,
            raw,
            backtrace: None
        }
    }

    fn route_reply(&mut self, scope: &mut Scope, mut msg: Message) {
        let eid = match msg.pop_header_u32() {
            Some(id) => EndpointId(id as usize),
            None => {
                debug!("dropping a reply with no backtrace");
                return;
            }
        };

        if self.can_send.remove(&eid) {
            if let Some(pipe) = self.pipes.get_mut(&eid) {
                pipe.send(scope, msg);
                return;
            }
        }
        debug!("[{:?}] reply destination gone or busy, reply dropped", eid);
    }

    fn try_deliver(&mut self, scope: &mut Scope) {
        if self.pending_recv.is_none() {
            return;
        }
        if let Some((eid, mut msg)) = self.fq.pop() {
            let timeout = self.pending_recv.take().unwrap();

            if !self.raw {
                self.backtrace = Some(msg.take_header());
            }
            clear_timeout(scope, timeout);
            notify(&self.reply_tx, Reply::MsgRecv(msg));
            if let Some(pipe) = self.pipes.get_mut(&eid) {
                pipe.recv(scope);
            }
        }
    }
}

impl Protocol for Rep {
    fn id(&self) -> u16 {
        SocketType::Rep.id()
    }

    fn peer_id(&self) -> u16 {
        SocketType::Rep.peer().id()
    }

    fn add_pipe(&mut self, _scope: &mut Scope, pipe: Pipe) -> io::Result<()> {
        self.fq.add(pipe.eid(), pipe.recv_priority());
        self.pipes.insert(pipe.eid(), pipe);
        Ok(())
    }

    fn remove_pipe(&mut self, _scope: &mut Scope, eid: EndpointId) -> Option<Pipe> {
        self.fq.remove(eid);
        self.can_send.remove(&eid);
        self.pipes.remove(&eid)
    }

    fn open_pipe(&mut self, scope: &mut Scope, eid: EndpointId) {
        self.pipes.get_mut(&eid).map(|p| p.open(scope));
    }

    fn ready(&mut self, scope: &mut Scope, eid: EndpointId, events: mio::Ready) {
        self.pipes.get_mut(&eid).map(|p| p.ready(scope, events));
    }

    fn on_pipe_timeout(&mut self, scope: &mut Scope, eid: EndpointId) {
        self.pipes.get_mut(&eid).map(|p| p.on_timeout(scope));
    }

    fn on_pipe_opened(&mut self, _scope: &mut Scope, _eid: EndpointId) {
    }

    fn on_pipe_can_send(&mut self, _scope: &mut Scope, eid: EndpointId) {
        self.can_send.insert(eid);
    }

    fn on_send_done(&mut self, _scope: &mut Scope, eid: EndpointId) {
        self.pipes.get_mut(&eid).map(|p| p.acked_send());
    }

    fn on_recv_done(&mut self, scope: &mut Scope, eid: EndpointId, mut msg: Message) {
        msg.push_header_u32(eid.0 as u32);
        if restore_backtrace(&mut msg) {
            self.fq.push(eid, msg);
            self.try_deliver(scope);
        } else {
            debug!("[{:?}] dropping malformed request", eid);
            self.pipes.get_mut(&eid).map(|p| p.recv(scope));
        }
    }

    fn send(&mut self, scope: &mut Scope, msg: Message, timeout: Timeout) {
        if self.raw {
            self.route_reply(scope, msg);
        } else {
            match self.backtrace.take() {
                Some(backtrace) => {
                    let mut reply = msg;
                    reply.set_header(backtrace);
                    self.route_reply(scope, reply);
                }
                None => {
                    notify(&self.reply_tx, Reply::MsgNotSent(
                        other_io_error("cannot send a reply before receiving a request")));
                    clear_timeout(scope, timeout);
                    return;
                }
            }
        }

        notify(&self.reply_tx, Reply::MsgSent);
        clear_timeout(scope, timeout);
    }

    fn on_send_timeout(&mut self, _scope: &mut Scope) {
    }

    fn recv(&mut self, scope: &mut Scope, timeout: Timeout) {
        self.pending_recv = Some(timeout);
        self.try_deliver(scope);
    }

    fn on_recv_timeout(&mut self, _scope: &mut Scope) {
        self.pending_recv = None;
        notify(&self.reply_tx, Reply::MsgNotRecv(timed_out_io_error("recv timed out")));
    }

    fn ready_to_send(&self) -> bool {
        self.raw || self.backtrace.is_some()
    }

    fn ready_to_recv(&self) -> bool {
        self.fq.can_recv()
    }

    fn has_pending_send(&self) -> bool {
        self.pipes.values().any(|p| p.is_sending())
    }

    fn abort_pending(&mut self, scope: &mut Scope) {
        if let Some(timeout) = self.pending_recv.take() {
            clear_timeout(scope, timeout);
            notify(&self.reply_tx, Reply::MsgNotRecv(terminated_io_error()));
        }
    }

    fn destroy(&mut self, _scope: &mut Scope) -> Vec<Pipe> {
        self.pipes.drain().map(|(_, pipe)| pipe).collect()
    }
}
