// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;
use std::time::Duration;

use crate::global::{EndpointId, SocketId};
use crate::reactor::{self, Scheduled, Signal, Task};
use crate::transport::{acceptor, pipe};

/// The worker context narrowed to one socket: everything a socket, its
/// protocol and its endpoints may do while one of their handlers runs.
pub struct Scope<'a> {
    ctx: &'a mut reactor::Context,
    sid: SocketId
}

impl<'a> Scope<'a> {
    pub fn new(ctx: &'a mut reactor::Context, sid: SocketId) -> Scope<'a> {
        Scope { ctx, sid }
    }

    pub fn own_sender(&self) -> reactor::WorkerSender {
        self.ctx.own_sender()
    }

    pub fn registry(&self) -> crate::transport::inproc::Registry {
        self.ctx.registry.clone()
    }

    pub fn next_eid(&mut self) -> EndpointId {
        self.ctx.next_eid()
    }

    /// Routes readiness of the endpoint's descriptor back to this socket.
    pub fn register_owner(&mut self, eid: EndpointId) {
        self.ctx.owners.insert(eid.token(), self.sid);
    }

    pub fn forget_owner(&mut self, eid: EndpointId) {
        self.ctx.owners.remove(&eid.token());
    }

    pub fn schedule(&mut self, delay: Duration, task: Task) -> io::Result<Scheduled> {
        Ok(self.ctx.timers.schedule(delay, task))
    }

    pub fn cancel(&mut self, handle: Scheduled) {
        self.ctx.timers.cancel(&handle);
    }

    pub fn schedule_cancel_send(&mut self, delay: Duration) -> io::Result<Scheduled> {
        let sid = self.sid;
        self.schedule(delay, Task::CancelSend(sid))
    }

    pub fn schedule_cancel_recv(&mut self, delay: Duration) -> io::Result<Scheduled> {
        let sid = self.sid;
        self.schedule(delay, Task::CancelRecv(sid))
    }

    pub fn schedule_resend(&mut self, delay: Duration) -> io::Result<Scheduled> {
        let sid = self.sid;
        self.schedule(delay, Task::Resend(sid))
    }

    pub fn schedule_survey_deadline(&mut self, delay: Duration) -> io::Result<Scheduled> {
        let sid = self.sid;
        self.schedule(delay, Task::SurveyDeadline(sid))
    }

    pub fn schedule_reconnect(&mut self, eid: EndpointId, delay: Duration) -> io::Result<Scheduled> {
        let sid = self.sid;
        self.schedule(delay, Task::Reconnect(sid, eid))
    }

    pub fn schedule_rebind(&mut self, eid: EndpointId, delay: Duration) -> io::Result<Scheduled> {
        let sid = self.sid;
        self.schedule(delay, Task::Rebind(sid, eid))
    }

    pub fn schedule_linger(&mut self, delay: Duration) -> io::Result<Scheduled> {
        let sid = self.sid;
        self.schedule(delay, Task::Linger(sid))
    }

    /// Narrows further to one endpoint, the view transport state machines get.
    pub fn endpoint(&mut self, eid: EndpointId) -> EndpointScope<'_> {
        EndpointScope {
            ctx: &mut *self.ctx,
            sid: self.sid,
            eid
        }
    }
}

/// The worker context narrowed to one endpoint of one socket.
/// Poll registrations use the endpoint's token and raised events are routed
/// to the owning socket through the worker's signal queue.
pub struct EndpointScope<'a> {
    ctx: &'a mut reactor::Context,
    sid: SocketId,
    eid: EndpointId
}

impl<'a> pipe::Context for EndpointScope<'a> {
    fn register(&mut self, io: &dyn mio::Evented, interest: mio::Ready, opt: mio::PollOpt) -> io::Result<()> {
        self.ctx.poll.register(io, self.eid.token(), interest, opt)
    }

    fn reregister(&mut self, io: &dyn mio::Evented, interest: mio::Ready, opt: mio::PollOpt) -> io::Result<()> {
        self.ctx.poll.reregister(io, self.eid.token(), interest, opt)
    }

    fn deregister(&mut self, io: &dyn mio::Evented) -> io::Result<()> {
        self.ctx.poll.deregister(io)
    }

    fn raise(&mut self, evt: pipe::Event) {
        self.ctx.raise(Signal::Pipe(self.sid, self.eid, evt));
    }

    fn schedule(&mut self, delay: Duration) -> io::Result<Scheduled> {
        Ok(self.ctx.timers.schedule(delay, Task::EndpointTimeout(self.sid, self.eid)))
    }

    fn cancel(&mut self, handle: Scheduled) {
        self.ctx.timers.cancel(&handle);
    }
}

impl<'a> acceptor::Context for EndpointScope<'a> {
    fn register(&mut self, io: &dyn mio::Evented, interest: mio::Ready, opt: mio::PollOpt) -> io::Result<()> {
        self.ctx.poll.register(io, self.eid.token(), interest, opt)
    }

    fn deregister(&mut self, io: &dyn mio::Evented) -> io::Result<()> {
        self.ctx.poll.deregister(io)
    }

    fn raise(&mut self, evt: acceptor::Event) {
        self.ctx.raise(Signal::Acceptor(self.sid, self.eid, evt));
    }
}
