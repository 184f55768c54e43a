// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::collections::HashMap;
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
use super::{clear_timeout, notify, Protocol, Timeout};

/// One-to-one: exactly one peer connection at a time; additional
/// connection attempts are refused.
pub struct Pair {
    reply_tx: Sender<Reply>,
    pipes: HashMap<EndpointId, Pipe>,
    peer: Option<EndpointId>,
    can_send: bool,
    fq: FairQueue,
    pending_send: Option<(Message, Timeout)>,
    pending_recv: Option<Timeout>
}

impl Pair {
    pub fn new(reply_tx: Sender<Reply>) -> Pair {
        Pair {
            reply_tx,
            pipes: HashMap::new(),
            peer: None,
            can_send: false,
            fq: FairQueue::new(),
            pending_send: None,
            pending_recv: None
        }
    }

    fn send_to_peer(&mut self, scope: &mut Scope, msg: Message, timeout: Timeout) {
        let eid = self.peer.unwrap();

        self.can_send = false;
        if let Some(pipe) = self.pipes.get_mut(&eid) {
            pipe.send(scope, msg);
        }
        notify(&self.reply_tx, Reply::MsgSent);
        clear_timeout(scope, timeout);
    }

    fn try_flush_pending_send(&mut self, scope: &mut Scope) {
        if self.can_send && self.peer.is_some() {
            if let Some((msg, timeout)) = self.pending_send.take() {
                self.send_to_peer(scope, msg, timeout);
            }
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

impl Protocol for Pair {
    fn id(&self) -> u16 {
        SocketType::Pair.id()
    }

    fn peer_id(&self) -> u16 {
        SocketType::Pair.peer().id()
    }

    fn add_pipe(&mut self, _scope: &mut Scope, pipe: Pipe) -> io::Result<()> {
        if !self.pipes.is_empty() {
            return Err(other_io_error("pair accepts a single connection"));
        }

        self.fq.add(pipe.eid(), pipe.recv_priority());
        self.pipes.insert(pipe.eid(), pipe);
        Ok(())
    }

    fn remove_pipe(&mut self, _scope: &mut Scope, eid: EndpointId) -> Option<Pipe> {
        self.fq.remove(eid);
        if self.peer == Some(eid) {
            self.peer = None;
            self.can_send = false;
        }
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

    fn on_pipe_opened(&mut self, _scope: &mut Scope, eid: EndpointId) {
        debug!("pair peer attached: [{:?}]", eid);
        self.peer = Some(eid);
    }

    fn on_pipe_can_send(&mut self, scope: &mut Scope, eid: EndpointId) {
        if self.peer == Some(eid) {
            self.can_send = true;
            self.try_flush_pending_send(scope);
        }
    }

    fn on_send_done(&mut self, _scope: &mut Scope, eid: EndpointId) {
        self.pipes.get_mut(&eid).map(|p| p.acked_send());
    }

    fn on_recv_done(&mut self, scope: &mut Scope, eid: EndpointId, msg: Message) {
        self.fq.push(eid, msg);
        self.try_deliver(scope);
    }

    fn send(&mut self, scope: &mut Scope, msg: Message, timeout: Timeout) {
        if self.can_send && self.peer.is_some() {
            self.send_to_peer(scope, msg, timeout);
        } else {
            self.pending_send = Some((msg, timeout));
        }
    }

    fn on_send_timeout(&mut self, _scope: &mut Scope) {
        self.pending_send = None;
        notify(&self.reply_tx, Reply::MsgNotSent(timed_out_io_error("send timed out")));
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
        self.can_send
    }

    fn ready_to_recv(&self) -> bool {
        self.fq.can_recv()
    }

    fn has_pending_send(&self) -> bool {
        self.pending_send.is_some() || self.pipes.values().any(|p| p.is_sending())
    }

    fn abort_pending(&mut self, scope: &mut Scope) {
        if let Some((_, timeout)) = self.pending_send.take() {
            clear_timeout(scope, timeout);
            notify(&self.reply_tx, Reply::MsgNotSent(terminated_io_error()));
        }
        if let Some(timeout) = self.pending_recv.take() {
            clear_timeout(scope, timeout);
            notify(&self.reply_tx, Reply::MsgNotRecv(terminated_io_error()));
        }
    }

    fn destroy(&mut self, _scope: &mut Scope) -> Vec<Pipe> {
        self.pipes.drain().map(|(_, pipe)| pipe).collect()
    }
}
