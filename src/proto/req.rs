// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::collections::HashMap;
use std::io;
use std::sync::mpsc::Sender;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use crate::core::config::SocketOption;
use crate::core::context::Scope;
use crate::core::endpoint::Pipe;
use crate::core::socket::Reply;
use crate::global::{EndpointId, SocketType};
use crate::io_error::{invalid_input_io_error, other_io_error, terminated_io_error, timed_out_io_error};
use crate::message::Message;

use super::fq::FairQueue;
use super::lb::LoadBalance;
use super::{
    clear_timeout, initial_exchange_id, next_exchange_id, notify, restore_backtrace,
    Protocol, Timeout,
};

const DEFAULT_RESEND_IVL: Duration = Duration::from_secs(60);

/// Raw request socket: load-balances whatever frame it is given, headers
/// included, and hands replies back with their backtrace restored. No
/// request state is kept; devices build on this.
pub struct XReq {
    reply_tx: Sender<Reply>,
    pipes: HashMap<EndpointId, Pipe>,
    lb: LoadBalance,
    fq: FairQueue,
    pending_send: Option<(Message, Timeout)>,
    pending_recv: Option<Timeout>
}

impl XReq {
    pub fn new(reply_tx: Sender<Reply>) -> XReq {
        XReq {
            reply_tx,
            pipes: HashMap::new(),
            lb: LoadBalance::new(),
            fq: FairQueue::new(),
            pending_send: None,
            pending_recv: None
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

impl Protocol for XReq {
    fn id(&self) -> u16 {
        SocketType::Req.id()
    }

    fn peer_id(&self) -> u16 {
        SocketType::Req.peer().id()
    }

    fn add_pipe(&mut self, _scope: &mut Scope, pipe: Pipe) -> io::Result<()> {
        self.lb.add(pipe.eid(), pipe.send_priority());
        self.fq.add(pipe.eid(), pipe.recv_priority());
        self.pipes.insert(pipe.eid(), pipe);
        Ok(())
    }

    fn remove_pipe(&mut self, _scope: &mut Scope, eid: EndpointId) -> Option<Pipe> {
        self.lb.remove(eid);
        self.fq.remove(eid);
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

    fn on_recv_done(&mut self, scope: &mut Scope, eid: EndpointId, mut msg: Message) {
        if restore_backtrace(&mut msg) {
            self.fq.push(eid, msg);
            self.try_deliver(scope);
        } else {
            debug!("[{:?}] dropping malformed reply", eid);
            self.pipes.get_mut(&eid).map(|p| p.recv(scope));
        }
    }

    fn send(&mut self, scope: &mut Scope, msg: Message, timeout: Timeout) {
        self.pending_send = Some((msg, timeout));
        self.try_flush_pending_send(scope);
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
        self.lb.can_send()
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

/// Request socket: tags each request with an exchange id, resends the
/// outstanding request on an interval until its reply arrives, and discards
/// replies that do not answer the current request. A fresh send replaces the
/// outstanding request.
pub struct Req {
    reply_tx: Sender<Reply>,
    pipes: HashMap<EndpointId, Pipe>,
    lb: LoadBalance,
    req_id: u32,
    request: Option<Message>,
    delivered: bool,
    resend_ivl: Duration,
    resend_timer: Timeout,
    reply: Option<(EndpointId, Message)>,
    pending_recv: Option<Timeout>
}

impl Req {
    pub fn new(reply_tx: Sender<Reply>) -> Req {
        Req {
            reply_tx,
            pipes: HashMap::new(),
            lb: LoadBalance::new(),
            req_id: initial_exchange_id(),
            request: None,
            delivered: false,
            resend_ivl: DEFAULT_RESEND_IVL,
            resend_timer: None,
            reply: None,
            pending_recv: None
        }
    }

    fn try_send_request(&mut self, scope: &mut Scope) {
        if self.delivered || self.request.is_none() {
            return;
        }
        if let Some(eid) = self.lb.pop() {
            let msg = self.request.as_ref().unwrap().clone();

            if let Some(pipe) = self.pipes.get_mut(&eid) {
                pipe.send(scope, msg);
                self.delivered = true;
            }
        }
    }

    fn drop_buffered_reply(&mut self, scope: &mut Scope) {
        if let Some((eid, _)) = self.reply.take() {
            self.pipes.get_mut(&eid).map(|p| p.recv(scope));
        }
    }

    fn try_deliver(&mut self, scope: &mut Scope) {
        if self.pending_recv.is_none() || self.reply.is_none() {
            return;
        }

        let (eid, msg) = self.reply.take().unwrap();
        let timeout = self.pending_recv.take().unwrap();

        self.request = None;
        self.delivered = false;
        clear_timeout(scope, self.resend_timer.take());
        clear_timeout(scope, timeout);
        notify(&self.reply_tx, Reply::MsgRecv(msg));
        self.pipes.get_mut(&eid).map(|p| p.recv(scope));
    }
}

impl Protocol for Req {
    fn id(&self) -> u16 {
        SocketType::Req.id()
    }

    fn peer_id(&self) -> u16 {
        SocketType::Req.peer().id()
    }

    fn add_pipe(&mut self, _scope: &mut Scope, pipe: Pipe) -> io::Result<()> {
        self.lb.add(pipe.eid(), pipe.send_priority());
        self.pipes.insert(pipe.eid(), pipe);
        Ok(())
    }

    fn remove_pipe(&mut self, _scope: &mut Scope, eid: EndpointId) -> Option<Pipe> {
        // a buffered reply outlives the connection it came over
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
        self.try_send_request(scope);
    }

    fn on_send_done(&mut self, _scope: &mut Scope, eid: EndpointId) {
        self.pipes.get_mut(&eid).map(|p| p.acked_send());
    }

    fn on_recv_done(&mut self, scope: &mut Scope, eid: EndpointId, mut msg: Message) {
        let wanted = self.request.is_some()
            && restore_backtrace(&mut msg)
            && msg.get_header().len() == 4
            && BigEndian::read_u32(msg.get_header()) == self.req_id;

        if wanted {
            msg.clear_header();
            self.reply = Some((eid, msg));
            self.try_deliver(scope);
        } else {
            debug!("[{:?}] discarding reply to a request no longer outstanding", eid);
            self.pipes.get_mut(&eid).map(|p| p.recv(scope));
        }
    }

    fn send(&mut self, scope: &mut Scope, msg: Message, timeout: Timeout) {
        // a fresh request replaces the outstanding one
        clear_timeout(scope, self.resend_timer.take());
        self.drop_buffered_reply(scope);

        self.req_id = next_exchange_id(self.req_id);

        let mut request = msg;
        request.push_header_u32(self.req_id);
        request.share();

        self.request = Some(request);
        self.delivered = false;
        self.try_send_request(scope);

        notify(&self.reply_tx, Reply::MsgSent);
        clear_timeout(scope, timeout);
        self.resend_timer = scope.schedule_resend(self.resend_ivl).ok();
    }

    fn on_send_timeout(&mut self, _scope: &mut Scope) {
    }

    fn on_resend_timer(&mut self, scope: &mut Scope) {
        if self.request.is_some() {
            debug!("resending the outstanding request");
            self.delivered = false;
            self.try_send_request(scope);
            self.resend_timer = scope.schedule_resend(self.resend_ivl).ok();
        }
    }

    fn recv(&mut self, scope: &mut Scope, timeout: Timeout) {
        if self.request.is_none() && self.reply.is_none() {
            notify(&self.reply_tx, Reply::MsgNotRecv(
                other_io_error("cannot receive before sending a request")));
            return;
        }

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
        self.reply.is_some()
    }

    fn has_pending_send(&self) -> bool {
        self.pipes.values().any(|p| p.is_sending())
    }

    fn set_option(&mut self, option: &SocketOption) -> io::Result<()> {
        match *option {
            SocketOption::ResendInterval(ivl) => {
                if ivl.is_zero() {
                    return Err(invalid_input_io_error("resend interval cannot be zero"));
                }
                self.resend_ivl = ivl;
                Ok(())
            }
            _ => Err(invalid_input_io_error("option not supported by the protocol"))
        }
    }

    fn abort_pending(&mut self, scope: &mut Scope) {
        if let Some(timeout) = self.pending_recv.take() {
            clear_timeout(scope, timeout);
            notify(&self.reply_tx, Reply::MsgNotRecv(terminated_io_error()));
        }
    }

    fn destroy(&mut self, scope: &mut Scope) -> Vec<Pipe> {
        clear_timeout(scope, self.resend_timer.take());
        self.pipes.drain().map(|(_, pipe)| pipe).collect()
    }
}
