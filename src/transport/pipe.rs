// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;
use std::time::Duration;

use crate::message::Message;
use crate::reactor::Scheduled;

/// Events a transport pipe raises to the protocol that owns it.
pub enum Event {
    /// The connection is established and handshaken; the pipe accepts
    /// send and receive operations from now on.
    Opened,
    /// The pipe can take the next outgoing message without blocking.
    CanSend,
    /// The previously submitted message has been fully written out.
    Sent,
    /// A whole incoming message is available.
    Received(Message),
    /// The connection failed; the pipe is dead and must be dropped.
    Error(io::Error)
}

impl Event {
    pub fn name(&self) -> &'static str {
        match *self {
            Event::Opened => "Opened",
            Event::CanSend => "CanSend",
            Event::Sent => "Sent",
            Event::Received(_) => "Received",
            Event::Error(_) => "Error"
        }
    }
}

/// Execution context handed to a pipe while one of its handlers runs.
/// Registrations use the pipe's own token, timers fire back into
/// `Pipe::on_timeout`, and raised events are routed to the owning protocol.
pub trait Context {
    fn register(&mut self, io: &dyn mio::Evented, interest: mio::Ready, opt: mio::PollOpt) -> io::Result<()>;
    fn reregister(&mut self, io: &dyn mio::Evented, interest: mio::Ready, opt: mio::PollOpt) -> io::Result<()>;
    fn deregister(&mut self, io: &dyn mio::Evented) -> io::Result<()>;
    fn raise(&mut self, evt: Event);
    fn schedule(&mut self, delay: Duration) -> io::Result<Scheduled>;
    fn cancel(&mut self, handle: Scheduled);
}

/// A connection presented to the protocol layer as a conduit of whole
/// messages. At most one send and one receive are in flight at any time;
/// the owner must wait for `Sent`/`Received` before submitting the next
/// operation.
pub trait Pipe {
    fn open(&mut self, ctx: &mut dyn Context);
    fn close(&mut self, ctx: &mut dyn Context);
    fn send(&mut self, ctx: &mut dyn Context, msg: Message);
    fn recv(&mut self, ctx: &mut dyn Context);
    fn ready(&mut self, ctx: &mut dyn Context, events: mio::Ready);
    fn on_timeout(&mut self, ctx: &mut dyn Context);
}
