// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;

use super::pipe;

/// Events an acceptor raises to its owning socket.
pub enum Event {
    /// One or more connections were accepted; each becomes a pipe
    /// anchored to the listening endpoint's socket.
    Accepted(Vec<Box<dyn pipe::Pipe>>),
    /// The listener failed; the socket closes it and binds again later.
    Error(io::Error)
}

impl Event {
    pub fn name(&self) -> &'static str {
        match *self {
            Event::Accepted(_) => "Accepted",
            Event::Error(_) => "Error"
        }
    }
}

pub trait Context {
    fn register(&mut self, io: &dyn mio::Evented, interest: mio::Ready, opt: mio::PollOpt) -> io::Result<()>;
    fn deregister(&mut self, io: &dyn mio::Evented) -> io::Result<()>;
    fn raise(&mut self, evt: Event);
}

/// A bound listener driving an accept loop.
pub trait Acceptor {
    fn open(&mut self, ctx: &mut dyn Context);
    fn close(&mut self, ctx: &mut dyn Context);
    fn ready(&mut self, ctx: &mut dyn Context, events: mio::Ready);
}
