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

/// Respondent socket: surveys are fair-queued from all connected surveyors,
/// the response is routed back along the survey's backtrace. Cooked mode
/// holds the backtrace of the last delivered survey; a response without a
/// survey in hand is a state error.
pub struct Respondent {
    reply_tx: Sender<Reply>,
    pipes: HashMap<EndpointId, Pipe>,
    fq: FairQueue,
    can_send: HashSet<EndpointId>,
    pending_recv: Option<Timeout>,
    raw: bool,
    backtrace: Option<Vec<u8>>
}

impl Respondent {
    pub fn new(reply_tx: Sender<Reply>) -> Respondent {
        Respondent::with_raw(reply_tx, false)
    }

    pub fn new_raw(reply_tx: Sender<Reply>) -> Respondent {
        Respondent::with_raw(reply_tx, true)
    }

    fn with_raw(reply_tx: Sender<Reply>, raw: bool) -> Respondent {
        Respondent {
            reply_tx,
            pipes: HashMap::new(),
            fq: FairQueue::new(),
            can_send: HashSet::new(),
            pending_recv: None,
            raw,
            backtrace: None
        }
    }

    fn route_response(&mut self, scope: &mut Scope, mut msg: Message) {
        let eid = match msg.pop_header_u32() {
            Some(id) => EndpointId(id as usize),
            None => {
                debug!("dropping a response with no backtrace");
                return;
            }
        };

        if self.can_send.remove(&eid) {
            if let Some(pipe) = self.pipes.get_mut(&eid) {
                pipe.send(scope, msg);
                return;
            }
        }
        debug!("[{:?}] response destination gone or busy, response dropped", eid);
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

impl Protocol for Respondent {
    fn id(&self) -> u16 {
        SocketType::Respondent.id()
    }

    fn peer_id(&self) -> u16 {
        SocketType::Respondent.peer().id()
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
            debug!("[{:?}] dropping malformed survey", eid);
            self.pipes.get_mut(&eid).map(|p| p.recv(scope));
        }
    }

    fn send(&mut self, scope: &mut Scope, msg: Message, timeout: Timeout) {
        if self.raw {
            self.route_response(scope, msg);
        } else {
            match self.backtrace.take() {
                Some(backtrace) => {
                    let mut response = msg;
                    response.set_header(backtrace);
                    self.route_response(scope, response);
                }
                None => {
                    notify(&self.reply_tx, Reply::MsgNotSent(
                        other_io_error("cannot respond before receiving a survey")));
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
