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
use crate::io_error::other_io_error;
use crate::message::Message;

use super::dist::Distribution;
use super::{clear_timeout, notify, Protocol, Timeout};

/// Publisher: every message is distributed to all writable subscribers;
/// slow subscribers are skipped, never waited for.
pub struct Pub {
    reply_tx: Sender<Reply>,
    pipes: HashMap<EndpointId, Pipe>,
    dist: Distribution
}

impl Pub {
    pub fn new(reply_tx: Sender<Reply>) -> Pub {
        Pub {
            reply_tx,
            pipes: HashMap::new(),
            dist: Distribution::new()
        }
    }

    fn broadcast(&mut self, scope: &mut Scope, mut msg: Message) {
        msg.share();
        for eid in self.dist.take_ready() {
            if let Some(pipe) = self.pipes.get_mut(&eid) {
                pipe.send(scope, msg.clone());
            }
        }
    }
}

impl Protocol for Pub {
    fn id(&self) -> u16 {
        SocketType::Pub.id()
    }

    fn peer_id(&self) -> u16 {
        SocketType::Pub.peer().id()
    }

    fn add_pipe(&mut self, _scope: &mut Scope, pipe: Pipe) -> io::Result<()> {
        self.pipes.insert(pipe.eid(), pipe);
        Ok(())
    }

    fn remove_pipe(&mut self, _scope: &mut Scope, eid: EndpointId) -> Option<Pipe> {
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

    fn on_recv_done(&mut self, _scope: &mut Scope, _eid: EndpointId, _msg: Message) {
    }

    fn send(&mut self, scope: &mut Scope, msg: Message, timeout: Timeout) {
        self.broadcast(scope, msg);
        notify(&self.reply_tx, Reply::MsgSent);
        clear_timeout(scope, timeout);
    }

    fn on_send_timeout(&mut self, _scope: &mut Scope) {
    }

    fn recv(&mut self, _scope: &mut Scope, _timeout: Timeout) {
        notify(&self.reply_tx, Reply::MsgNotRecv(other_io_error("recv not supported by protocol")));
    }

    fn on_recv_timeout(&mut self, _scope: &mut Scope) {
    }

    fn ready_to_send(&self) -> bool {
        true
    }

    fn ready_to_recv(&self) -> bool {
        false
    }

    fn has_pending_send(&self) -> bool {
        self.pipes.values().any(|p| p.is_sending())
    }

    fn abort_pending(&mut self, _scope: &mut Scope) {
    }

    fn destroy(&mut self, _scope: &mut Scope) -> Vec<Pipe> {
        self.pipes.drain().map(|(_, pipe)| pipe).collect()
    }
}
