// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;

use log::debug;

use crate::io_error::other_io_error;
use crate::message::Message;
use crate::reactor::Scheduled;
use crate::transport::pipe::{Context, Event};

use super::active::Active;
use super::dead::Dead;
use super::{
    check_handshake, is_dead_event, map_non_block, send_and_check_handshake,
    transition_if_ok, PipeState, StepStream,
};

pub struct HandshakeTx<T : StepStream + 'static> {
    stream: T,
    proto_ids: (u16, u16),
    recv_max_size: Option<u64>,
    deadline: Scheduled
}

impl<T : StepStream> HandshakeTx<T> {
    pub fn new(stream: T,
               pids: (u16, u16),
               recv_max_size: Option<u64>,
               deadline: Scheduled) -> HandshakeTx<T> {
        HandshakeTx {
            stream,
            proto_ids: pids,
            recv_max_size,
            deadline
        }
    }

    fn write_handshake(&mut self, ctx: &mut dyn Context) -> io::Result<()> {
        send_and_check_handshake(&mut self.stream, self.proto_ids)?;
        debug!("handshake sent");
        ctx.reregister(&self.stream, mio::Ready::readable(), mio::PollOpt::level())
    }
}

impl<T : StepStream> From<HandshakeTx<T>> for HandshakeRx<T> {
    fn from(state: HandshakeTx<T>) -> HandshakeRx<T> {
        HandshakeRx {
            stream: state.stream,
            proto_ids: state.proto_ids,
            recv_max_size: state.recv_max_size,
            deadline: state.deadline,
            received: [0u8; 8],
            read: 0
        }
    }
}

impl<T : StepStream> PipeState<T> for HandshakeTx<T> {
    fn name(&self) -> &'static str {
        "HandshakeTx"
    }

    fn open(self: Box<Self>, _: &mut dyn Context) -> Box<dyn PipeState<T>> {
        self
    }

    fn close(self: Box<Self>, ctx: &mut dyn Context) -> Box<dyn PipeState<T>> {
        ctx.cancel(self.deadline);
        let _ = ctx.deregister(&self.stream);
        Box::new(Dead)
    }

    fn send(self: Box<Self>, _: &mut dyn Context, _: Message) -> Box<dyn PipeState<T>> {
        self
    }

    fn recv(self: Box<Self>, _: &mut dyn Context) -> Box<dyn PipeState<T>> {
        self
    }

    fn ready(mut self: Box<Self>, ctx: &mut dyn Context, events: mio::Ready) -> Box<dyn PipeState<T>> {
        if events.is_writable() {
            let res = self.write_handshake(ctx);

            transition_if_ok::<HandshakeTx<T>, HandshakeRx<T>, T>(self, ctx, res)
        } else if is_dead_event(events) {
            self.error(ctx, other_io_error("connection closed during handshake"))
        } else {
            self
        }
    }

    fn on_timeout(self: Box<Self>, ctx: &mut dyn Context) -> Box<dyn PipeState<T>> {
        self.error(ctx, io::Error::new(io::ErrorKind::TimedOut, "handshake timed out"))
    }
}

pub struct HandshakeRx<T : StepStream + 'static> {
    stream: T,
    proto_ids: (u16, u16),
    recv_max_size: Option<u64>,
    deadline: Scheduled,
    received: [u8; 8],
    read: usize
}

impl<T : StepStream> HandshakeRx<T> {
    /// Accumulates handshake bytes; Ok(true) once all eight are in and valid.
    fn read_handshake(&mut self) -> io::Result<bool> {
        while self.read < self.received.len() {
            let slot = self.read;
            match map_non_block(self.stream.read(&mut self.received[slot..]))? {
                Some(0) => return Err(other_io_error("connection closed during handshake")),
                Some(n) => self.read += n,
                None => return Ok(false)
            }
        }

        check_handshake(self.proto_ids, &self.received)?;
        debug!("handshake received");
        Ok(true)
    }
}

impl<T : StepStream> PipeState<T> for HandshakeRx<T> {
    fn name(&self) -> &'static str {
        "HandshakeRx"
    }

    fn open(self: Box<Self>, _: &mut dyn Context) -> Box<dyn PipeState<T>> {
        self
    }

    fn close(self: Box<Self>, ctx: &mut dyn Context) -> Box<dyn PipeState<T>> {
        ctx.cancel(self.deadline);
        let _ = ctx.deregister(&self.stream);
        Box::new(Dead)
    }

    fn send(self: Box<Self>, _: &mut dyn Context, _: Message) -> Box<dyn PipeState<T>> {
        self
    }

    fn recv(self: Box<Self>, _: &mut dyn Context) -> Box<dyn PipeState<T>> {
        self
    }

    fn ready(mut self: Box<Self>, ctx: &mut dyn Context, events: mio::Ready) -> Box<dyn PipeState<T>> {
        if events.is_readable() {
            match self.read_handshake() {
                Ok(false) => self,
                Ok(true) => {
                    ctx.cancel(self.deadline);
                    ctx.raise(Event::Opened);
                    ctx.raise(Event::CanSend);

                    let mut active = Active::new(self.stream, self.recv_max_size);
                    match active.enter(ctx) {
                        Ok(()) => Box::new(active),
                        Err(e) => Box::new(active).error(ctx, e)
                    }
                }
                Err(e) => self.error(ctx, e)
            }
        } else if is_dead_event(events) {
            self.error(ctx, other_io_error("connection closed during handshake"))
        } else {
            self
        }
    }

    fn on_timeout(self: Box<Self>, ctx: &mut dyn Context) -> Box<dyn PipeState<T>> {
        self.error(ctx, io::Error::new(io::ErrorKind::TimedOut, "handshake timed out"))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use super::super::{Initial, PipeState};

    fn handshaken_bytes(proto_id: u16) -> Vec<u8> {
        let mut bytes = vec![0, 83, 80, 0, 0, 0, 0, 0];
        bytes[4] = (proto_id >> 8) as u8;
        bytes[5] = (proto_id & 0xff) as u8;
        bytes
    }

    #[test]
    fn handshake_exchange_reaches_active() {
        let pids = (crate::SocketType::Pair.id(), crate::SocketType::Pair.id());
        let mut stream = TestStepStream::with_input(handshaken_bytes(pids.1));
        stream.would_block_on_read = false;

        let mut ctx = TestPipeContext::new();
        let state = Box::new(Initial::new(stream, pids, None));
        let state = state.open(&mut ctx);
        let state = state.ready(&mut ctx, mio::Ready::writable());
        assert_eq!("HandshakeRx", state.name());

        let state = state.ready(&mut ctx, mio::Ready::readable());
        assert_eq!("Active", state.name());
        assert_eq!(1, ctx.cancelled);
        assert!(ctx.event_names().contains(&"Opened"));
        assert!(ctx.event_names().contains(&"CanSend"));
    }

    #[test]
    fn bad_preamble_kills_the_connection() {
        let pids = (crate::SocketType::Pair.id(), crate::SocketType::Pair.id());
        let stream = TestStepStream::with_input(vec![1, 2, 3, 4, 5, 6, 7, 8]);

        let mut ctx = TestPipeContext::new();
        let state = Box::new(Initial::new(stream, pids, None));
        let state = state.open(&mut ctx);
        let state = state.ready(&mut ctx, mio::Ready::writable());
        let state = state.ready(&mut ctx, mio::Ready::readable());

        assert_eq!("Dead", state.name());
        assert!(ctx.event_names().contains(&"Error"));
    }
}
