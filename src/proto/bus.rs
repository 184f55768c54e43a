// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::collections::HashMap;
use std::io;
use std::sync::mpsc::Sender;

use crate::core::context::Scope;
use crate::core::endpoint::Pipe;
use crate::core::socket::Reply;
use crate::global::{EndpointId, SocketType};
use crate::io_error::{terminated_io_error, timed_out_io_error};
use crate::message::Message;

use super::dist::Distribution;
use super::fq::FairQueue;
use super::{clear_timeout, notify, Protocol, Timeout};

/// Bus socket: sends are distributed to every connected peer, receives are
/// fair-queued. A socket only hears the others, never itself, since it holds
/// no pipe to itself.
pub struct Bus {
    reply_tx: Sender<Reply>,
    pipes: HashMap<EndpointId, Pipe>,
    dist: Distribution,
    fq: FairQueue,
    pending_recv: Option<Timeout>
}

impl Bus {
    pub fn new(reply_tx: Sender<Reply>) -> Bus {
        Bus {
            reply_tx,
            pipes: HashMap::new(),
            dist: Distribution::new(),
            fq: FairQueue::new(),
            pending_recv: None
        }
    }

    fn try_deliver(&mut self, scope: &mut Scope) {
        if self.pending_recv.is_none() {
            return;
        }
        if let Some((eid, msg)) = self.fq.pop() {
            let timeout = self.pending_recv.take().unwrap();

            clear_timeout(scope, timeout);
            notify(&self.reply_tx, Reply::MsgRecv(msg));
            if let Some(pipe) = self.pipes.get_mut(&eid) {
                pipe.recv(scope);
            }
        }
    }
}

impl Protocol for Bus {
    fn id(&self) -> u16 {
        SocketType::Bus.id()
    }

    fn peer_id(&self) -> u16 {
        SocketType::Bus.peer().id()
    }

    fn add_pipe(&mut self, _scope: &mut Scope, pipe: Pipe) -> io::Result<()> {
        self.fq.add(pipe.eid(), pipe.recv_priority());
        self.pipes.insert(pipe.eid(), pipe);
        Ok(())
    }

    fn remove_pipe(&mut self, _scope: &mut Scope, eid: EndpointId) -> Option<Pipe> {
        self.fq.remove(eid);
        self.dist.remove(eid);
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
        self.dist.activate(eid);
    }

    fn on_send_done(&mut self, _scope: &mut Scope, eid: EndpointId) {
        self.pipes.get_mut(&eid).map(|p| p.acked_send());
    }

    fn on_recv_done(&mut self, scope: &mut Scope, eid: EndpointId, msg: Message) {
        self.fq.push(eid, msg);
        self.try_deliver(scope);
    }

    fn send(&mut self, scope: &mut Scope, mut msg: Message, timeout: Timeout) {
        msg.share();
        for eid in self.dist.take_ready() {
            if let Some(pipe) = self.pipes.get_mut(&eid) {
                pipe.send(scope, msg.clone());
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
        true
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

/// Raw bus: the origin pipe id is kept in the header of received messages,
/// and a send whose header names an origin skips that pipe, so a device
/// pumping a bus socket into itself does not echo messages back to their
/// sender.
pub struct XBus {
    reply_tx: Sender<Reply>,
    pipes: HashMap<EndpointId, Pipe>,
    dist: Distribution,
    fq: FairQueue,
    pending_recv: Option<Timeout>
}

impl XBus {
    pub fn new(reply_tx: Sender<Reply>) -> XBus {
        XBus {
            reply_tx,
            pipes: HashMap::new(),
            dist: Distribution::new(),
            fq: FairQueue::new(),
            pending_recv: None
        }
    }

    fn try_deliver(&mut self, scope: &mut Scope) {
        if self.pending_recv.is_none() {
            return;
        }
        if let Some((eid, msg)) = self.fq.pop() {
            let timeout = self.pending_recv.take().unwrap();

            clear_timeout(scope, timeout);
            notify(&self.reply_tx, Reply::MsgRecv(msg));
            if let Some(pipe) = self.pipes.get_mut(&eid) {
                pipe.recv(scope);
            }
        }
    }
}

impl Protocol for XBus {
    fn id(&self) -> u16 {
        SocketType::Bus.id()
    }

    fn peer_id(&self) -> u16 {
        SocketType::Bus.peer().id()
    }

    fn add_pipe(&mut self, _scope: &mut Scope, pipe: Pipe) -> io::Result<()> {
        self.fq.add(pipe.eid(), pipe.recv_priority());
        self.pipes.insert(pipe.eid(), pipe);
        Ok(())
    }

    fn remove_pipe(&mut self, _scope: &mut Scope, eid: EndpointId) -> Option<Pipe> {
        self.fq.remove(eid);
        self.dist.remove(eid);
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
        self.dist.activate(eid);
    }

    fn on_send_done(&mut self, _scope: &mut Scope, eid: EndpointId) {
        self.pipes.get_mut(&eid).map(|p| p.acked_send());
    }

    fn on_recv_done(&mut self, scope: &mut Scope, eid: EndpointId, mut msg: Message) {
        msg.push_header_u32(eid.0 as u32);
        self.fq.push(eid, msg);
        self.try_deliver(scope);
    }

    fn send(&mut self, scope: &mut Scope, mut msg: Message, timeout: Timeout) {
        let origin = msg.pop_header_u32().map(|id| EndpointId(id as usize));

        msg.share();
        for eid in self.dist.take_ready_except(origin) {
            if let Some(pipe) = self.pipes.get_mut(&eid) {
                pipe.send(scope, msg.clone());
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
        true
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
