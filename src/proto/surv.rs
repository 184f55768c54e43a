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

use super::dist::Distribution;
use super::fq::FairQueue;
use super::{
    clear_timeout, initial_exchange_id, next_exchange_id, notify, restore_backtrace,
    Protocol, Timeout,
};

const DEFAULT_DEADLINE: Duration = Duration::from_millis(1000);

/// Raw surveyor: broadcasts whatever frame it is given and hands responses
/// back with their backtrace restored; devices build on this.
pub struct XSurveyor {
    reply_tx: Sender<Reply>,
    pipes: HashMap<EndpointId, Pipe>,
    dist: Distribution,
    fq: FairQueue,
    pending_recv: Option<Timeout>
}

impl XSurveyor {
    pub fn new(reply_tx: Sender<Reply>) -> XSurveyor {
        XSurveyor {
            reply_tx,
            pipes: HashMap::new(),
            dist: Distribution::new(),
            fq: FairQueue::new(),
            pending_recv: None
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

impl Protocol for XSurveyor {
    fn id(&self) -> u16 {
        SocketType::Surveyor.id()
    }

    fn peer_id(&self) -> u16 {
        SocketType::Surveyor.peer().id()
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
        if restore_backtrace(&mut msg) {
            self.fq.push(eid, msg);
            self.try_deliver(scope);
        } else {
            debug!("[{:?}] dropping malformed response", eid);
            self.pipes.get_mut(&eid).map(|p| p.recv(scope));
        }
    }

    fn send(&mut self, scope: &mut Scope, msg: Message, timeout: Timeout) {
        self.broadcast(scope, msg);
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

/// Surveyor socket: each survey is broadcast under a fresh exchange id and
/// opens a deadline window. Responses to anything but the current survey are
/// discarded; once the deadline expires the survey is closed and receive
/// fails until the next survey is sent.
pub struct Surveyor {
    reply_tx: Sender<Reply>,
    pipes: HashMap<EndpointId, Pipe>,
    dist: Distribution,
    fq: FairQueue,
    survey_id: u32,
    active: bool,
    expired: bool,
    deadline: Duration,
    deadline_timer: Timeout,
    pending_recv: Option<Timeout>
}

impl Surveyor {
    pub fn new(reply_tx: Sender<Reply>) -> Surveyor {
        Surveyor {
            reply_tx,
            pipes: HashMap::new(),
            dist: Distribution::new(),
            fq: FairQueue::new(),
            survey_id: initial_exchange_id(),
            active: false,
            expired: false,
            deadline: DEFAULT_DEADLINE,
            deadline_timer: None,
            pending_recv: None
        }
    }

    fn close_survey(&mut self, scope: &mut Scope) {
        self.active = false;
        self.expired = true;

        // stale responses are dropped; their pipes go back to reading
        while let Some((eid, _)) = self.fq.pop() {
            self.pipes.get_mut(&eid).map(|p| p.recv(scope));
        }

        if let Some(timeout) = self.pending_recv.take() {
            clear_timeout(scope, timeout);
            notify(&self.reply_tx, Reply::MsgNotRecv(timed_out_io_error("survey deadline expired")));
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

impl Protocol for Surveyor {
    fn id(&self) -> u16 {
        SocketType::Surveyor.id()
    }

    fn peer_id(&self) -> u16 {
        SocketType::Surveyor.peer().id()
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
        let wanted = self.active
            && restore_backtrace(&mut msg)
            && msg.get_header().len() == 4
            && BigEndian::read_u32(msg.get_header()) == self.survey_id;

        if wanted {
            msg.clear_header();
            self.fq.push(eid, msg);
            self.try_deliver(scope);
        } else {
            debug!("[{:?}] discarding response to an expired survey", eid);
            self.pipes.get_mut(&eid).map(|p| p.recv(scope));
        }
    }

    fn send(&mut self, scope: &mut Scope, msg: Message, timeout: Timeout) {
        // a new survey cancels the previous one
        clear_timeout(scope, self.deadline_timer.take());
        self.active = false;
        while let Some((eid, _)) = self.fq.pop() {
            self.pipes.get_mut(&eid).map(|p| p.recv(scope));
        }

        self.survey_id = next_exchange_id(self.survey_id);
        self.active = true;
        self.expired = false;

        let mut survey = msg;
        survey.push_header_u32(self.survey_id);
        survey.share();
        for eid in self.dist.take_ready() {
            if let Some(pipe) = self.pipes.get_mut(&eid) {
                pipe.send(scope, survey.clone());
            }
        }

        notify(&self.reply_tx, Reply::MsgSent);
        clear_timeout(scope, timeout);
        self.deadline_timer = scope.schedule_survey_deadline(self.deadline).ok();
    }

    fn on_send_timeout(&mut self, _scope: &mut Scope) {
    }

    fn on_survey_deadline(&mut self, scope: &mut Scope) {
        debug!("survey deadline expired");
        self.deadline_timer = None;
        self.close_survey(scope);
    }

    fn recv(&mut self, scope: &mut Scope, timeout: Timeout) {
        if !self.active {
            // past the deadline the failure reads as a timeout;
            // with no survey ever sent it is a state error
            let err = if self.expired {
                timed_out_io_error("survey deadline expired")
            } else {
                other_io_error("cannot receive before sending a survey")
            };

            notify(&self.reply_tx, Reply::MsgNotRecv(err));
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
        self.fq.can_recv()
    }

    fn has_pending_send(&self) -> bool {
        self.pipes.values().any(|p| p.is_sending())
    }

    fn set_option(&mut self, option: &SocketOption) -> io::Result<()> {
        match *option {
            SocketOption::SurveyDeadline(deadline) => {
                if deadline.is_zero() {
                    return Err(invalid_input_io_error("survey deadline cannot be zero"));
                }
                self.deadline = deadline;
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
        clear_timeout(scope, self.deadline_timer.take());
        self.pipes.drain().map(|(_, pipe)| pipe).collect()
    }
}
