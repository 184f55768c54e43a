// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;

use crate::message::Message;
use crate::transport::pipe::Context;

use super::handshake::HandshakeTx;
use super::{PipeState, StepStream, HANDSHAKE_TIMEOUT};

pub struct Initial<T : StepStream + 'static> {
    stream: T,
    proto_ids: (u16, u16),
    recv_max_size: Option<u64>
}

impl<T : StepStream> Initial<T> {
    pub fn new(stream: T, pids: (u16, u16), recv_max_size: Option<u64>) -> Initial<T> {
        Initial {
            stream,
            proto_ids: pids,
            recv_max_size
        }
    }
}

impl<T : StepStream> PipeState<T> for Initial<T> {
    fn name(&self) -> &'static str {
        "Initial"
    }

    fn open(self: Box<Self>, ctx: &mut dyn Context) -> Box<dyn PipeState<T>> {
        let registered = ctx.register(&self.stream, mio::Ready::writable(), mio::PollOpt::level());

        match registered.and_then(|_| ctx.schedule(HANDSHAKE_TIMEOUT)) {
            Ok(deadline) => Box::new(HandshakeTx::new(
                self.stream,
                self.proto_ids,
                self.recv_max_size,
                deadline)),
            Err(e) => self.error(ctx, e)
        }
    }

    fn close(self: Box<Self>, _: &mut dyn Context) -> Box<dyn PipeState<T>> {
        Box::new(super::dead::Dead)
    }

    fn send(self: Box<Self>, _: &mut dyn Context, _: Message) -> Box<dyn PipeState<T>> {
        self
    }

    fn recv(self: Box<Self>, _: &mut dyn Context) -> Box<dyn PipeState<T>> {
        self
    }

    fn ready(self: Box<Self>, _: &mut dyn Context, _: mio::Ready) -> Box<dyn PipeState<T>> {
        self
    }

    fn on_timeout(self: Box<Self>, ctx: &mut dyn Context) -> Box<dyn PipeState<T>> {
        self.error(ctx, io::Error::new(io::ErrorKind::TimedOut, "handshake timed out"))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use super::super::PipeState;
    use super::*;

    #[test]
    fn on_open_the_stream_should_be_registered() {
        let stream = TestStepStream::new();
        let state = Box::new(Initial::new(stream, (16, 16), None));
        let mut ctx = TestPipeContext::new();

        let new_state = state.open(&mut ctx);

        assert_eq!(1, ctx.registrations);
        assert_eq!(0, ctx.reregistrations);
        assert_eq!(1, ctx.scheduled);
        assert_eq!("HandshakeTx", new_state.name());
    }
}
