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
use crate::io_error::{other_io_error, terminated_io_error, timed_out_io_error};
use crate::message::Message;

use super::lb::LoadBalance;
use super::{clear_timeout, notify, Protocol, Timeout};

/// Pipeline head: each message goes to one writable peer,
/// load-balanced in send-priority order.
pub struct Push {
    reply_tx: Sender<Reply>,
    pipes: HashMap<EndpointId, Pipe>,
    lb: LoadBalance,
    pending_send: Option<(Message, Timeout)>
}

impl Push {
    pub fn new(reply_tx: Sender<Reply>) -> Push {
        Push {
            reply_tx,
            pipes: HashMap::new(),
            lb: LoadBalance::new(),
            pending_send: None
        }
    }

    fn try_flush_pending_send(&mut self, scope: &mut Scope) {
        if self.pending_send.is_none() {
            return;
        }
        if let Some(eid) = self.lb.pop() {
            let (msg, timeout) = self.pending_send.take().unwrap();

            if let Some(pipe) = self.pipes.get_mut(&eid) {
                pipe.send(scope, msg);
            }
            notify(&self.reply_tx, Reply::MsgSent);
            clear_timeout(scope, timeout);
        }
    }
}

impl Protocol for Push {
    fn id(&self) -> u16 {
        SocketType::Push.id()
    }

    fn peer_id(&self) -> u16 {
        SocketType::Push.peer().id()
    }

    fn add_pipe(&mut self, _scope: &mut Scope, pipe: Pipe) -> io::Result<()> {
        self.lb.add(pipe.eid(), pipe.send_priority());
        self.pipes.insert(pipe.eid(), pipe);
        Ok(())
    }

    fn remove_pipe(&mut self, _scope: &mut Scope, eid: EndpointId) -> Option<Pipe> {
        self.lb.remove(eid);
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

    fn on_pipe_can_send(&mut self, scope: &mut Scope, eid: EndpointId) {
        self.lb.activate(eid);
        self.try_flush_pending_send(scope);
    }

    fn on_send_done(&mut self, _scope: &mut Scope, eid: EndpointId) {
        self.pipes.get_mut(&eid).map(|p| p.acked_send());
    }

    fn on_recv_done(&mut self, _scope: &mut Scope, _eid: EndpointId, _msg: Message) {
    }

    fn send(&mut self, scope: &mut Scope, msg: Message, timeout: Timeout) {
        self.pending_send = Some((msg, timeout));
        self.try_flush_pending_send(scope);
    }

    fn on_send_timeout(&mut self, _scope: &mut Scope) {
        self.pending_send = None;
        notify(&self.reply_tx, Reply::MsgNotSent(timed_out_io_error("send timed out")));
    }

    fn recv(&mut self, _scope: &mut Scope, _timeout: Timeout) {
        notify(&self.reply_tx, Reply::MsgNotRecv(other_io_error("recv not supported by protocol")));
    }

    fn on_recv_timeout(&mut self, _scope: &mut Scope) {
    }

    fn ready_to_send(&self) -> bool {
        self.lb.can_send()
    }

    fn ready_to_recv(&self) -> bool {
        false
    }

    fn has_pending_send(&self) -> bool {
        self.pending_send.is_some() || self.pipes.values().any(|p| p.is_sending())
    }

    fn abort_pending(&mut self, scope: &mut Scope) {
        if let Some((_, timeout)) = self.pending_send.take() {
            clear_timeout(scope, timeout);
            notify(&self.reply_tx, Reply::MsgNotSent(terminated_io_error()));
        }
    }

    fn destroy(&mut self, _scope: &mut Scope) -> Vec<Pipe> {
        self.pipes.drain().map(|(_, pipe)| pipe).collect()
    }
}
