// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Building blocks for transports carried over a byte stream: the protocol
//! handshake and the length-prefixed message framing, written as a state
//! machine over any `StepStream`.
//!
//! States: `Initial` → `HandshakeTx` → `HandshakeRx` → `Active` → `Dead`.
//! The handshake is eight bytes in each direction and must complete within
//! `HANDSHAKE_TIMEOUT`; each message then travels as a 64 bit big-endian
//! length followed by the payload.

mod active;
mod dead;
mod handshake;
mod initial;
mod recv;
mod send;

use std::io;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use crate::io_error::{invalid_data_io_error, would_block_io_error};
use crate::message::Message;
use crate::transport::pipe::{Context, Event};

pub use self::initial::Initial;

pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(1000);

/// A non-blocking byte stream a framed pipe can be built over.
pub trait StepStream : io::Read + io::Write + mio::Evented + 'static {
}

pub trait PipeState<T : StepStream> {
    fn name(&self) -> &'static str;
    fn open(self: Box<Self>, ctx: &mut dyn Context) -> Box<dyn PipeState<T>>;
    fn close(self: Box<Self>, ctx: &mut dyn Context) -> Box<dyn PipeState<T>>;
    fn send(self: Box<Self>, ctx: &mut dyn Context, msg: Message) -> Box<dyn PipeState<T>>;
    fn recv(self: Box<Self>, ctx: &mut dyn Context) -> Box<dyn PipeState<T>>;
    fn ready(self: Box<Self>, ctx: &mut dyn Context, events: mio::Ready) -> Box<dyn PipeState<T>>;
    fn on_timeout(self: Box<Self>, ctx: &mut dyn Context) -> Box<dyn PipeState<T>>;

    fn error(self: Box<Self>, ctx: &mut dyn Context, err: io::Error) -> Box<dyn PipeState<T>> {
        ctx.raise(Event::Error(err));
        Box::new(dead::Dead)
    }
}

/// A framed connection over a byte stream, exposed as a transport pipe.
pub struct Pipe<T : StepStream + 'static> {
    state: Option<Box<dyn PipeState<T>>>
}

impl<T : StepStream + 'static> Pipe<T> {
    pub fn new(stream: T, pids: (u16, u16), recv_max_size: Option<u64>) -> Pipe<T> {
        Pipe {
            state: Some(Box::new(Initial::new(stream, pids, recv_max_size)))
        }
    }

    fn apply<F>(&mut self, transition: F) where F : FnOnce(Box<dyn PipeState<T>>) -> Box<dyn PipeState<T>> {
        if let Some(old_state) = self.state.take() {
            let new_state = transition(old_state);

            debug!("stream pipe now '{}'", new_state.name());
            self.state = Some(new_state);
        }
    }
}

impl<T : StepStream> super::pipe::Pipe for Pipe<T> {
    fn open(&mut self, ctx: &mut dyn Context) {
        self.apply(|s| s.open(ctx))
    }
    fn close(&mut self, ctx: &mut dyn Context) {
        self.apply(|s| s.close(ctx))
    }
    fn send(&mut self, ctx: &mut dyn Context, msg: Message) {
        self.apply(|s| s.send(ctx, msg))
    }
    fn recv(&mut self, ctx: &mut dyn Context) {
        self.apply(|s| s.recv(ctx))
    }
    fn ready(&mut self, ctx: &mut dyn Context, events: mio::Ready) {
        self.apply(|s| s.ready(ctx, events))
    }
    fn on_timeout(&mut self, ctx: &mut dyn Context) {
        self.apply(|s| s.on_timeout(ctx))
    }
}

// handshake is Zero, 'S', 'P', Version, Proto[2], Rsvd[2]
fn create_handshake(protocol_id: u16) -> [u8; 8] {
    let mut handshake = [0, 83, 80, 0, 0, 0, 0, 0];
    BigEndian::write_u16(&mut handshake[4..6], protocol_id);
    handshake
}

pub fn send_and_check_handshake<T : io::Write>(stream: &mut T, pids: (u16, u16)) -> io::Result<()> {
    let (proto_id, _) = pids;
    let handshake = create_handshake(proto_id);

    match stream.write(&handshake)? {
        8 => Ok(()),
        _ => Err(would_block_io_error("failed to send handshake"))
    }
}

pub fn check_handshake(pids: (u16, u16), handshake: &[u8; 8]) -> io::Result<()> {
    let (_, peer_proto_id) = pids;
    let expected_handshake = create_handshake(peer_proto_id);

    if handshake == &expected_handshake {
        Ok(())
    } else {
        Err(invalid_data_io_error("received bad handshake"))
    }
}

/// Maps the would-block error to `None` so callers can distinguish
/// "no progress possible" from a real failure.
pub fn map_non_block(res: io::Result<usize>) -> io::Result<Option<usize>> {
    match res {
        Ok(n) => Ok(Some(n)),
        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e)
    }
}

pub fn is_dead_event(events: mio::Ready) -> bool {
    let events = mio::unix::UnixReady::from(events);

    events.is_hup() || events.is_error()
}

pub fn transition<F, T, S>(f: Box<F>) -> Box<dyn PipeState<S>> where
    F : PipeState<S>,
    F : Into<T>,
    T : PipeState<S> + 'static,
    S : StepStream
{
    Box::new(Into::<T>::into(*f))
}

pub fn transition_if_ok<F, T, S>(f: Box<F>, ctx: &mut dyn Context, res: io::Result<()>) -> Box<dyn PipeState<S>> where
    F : PipeState<S> + 'static,
    F : Into<T>,
    T : PipeState<S> + 'static,
    S : StepStream
{
    match res {
        Ok(..) => transition::<F, T, S>(f),
        Err(e) => f.error(ctx, e)
    }
}

#[cfg(test)]
pub mod tests {
    use std::io;
    use std::time::Duration;

    use crate::message::Message;
    use crate::reactor::{Scheduled, Task, TimerSet};
    use crate::transport::pipe::{Context, Event};

    use super::StepStream;

    /// An in-memory stream with scripted input, recording output.
    pub struct TestStepStream {
        pub input: io::Cursor<Vec<u8>>,
        pub output: Vec<u8>,
        pub would_block_on_read: bool,
        pub would_block_on_write: bool
    }

    impl TestStepStream {
        pub fn new() -> TestStepStream {
            TestStepStream::with_input(Vec::new())
        }

        pub fn with_input(input: Vec<u8>) -> TestStepStream {
            TestStepStream {
                input: io::Cursor::new(input),
                output: Vec::new(),
                would_block_on_read: false,
                would_block_on_write: false
            }
        }
    }

    impl StepStream for TestStepStream {
    }

    impl io::Read for TestStepStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.would_block_on_read {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "scripted"));
            }
            match io::Read::read(&mut self.input, buf) {
                // an exhausted script reads like an idle socket, not a closed one
                Ok(0) if !buf.is_empty() => Err(io::Error::new(io::ErrorKind::WouldBlock, "drained")),
                other => other
            }
        }
    }

    impl io::Write for TestStepStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.would_block_on_write {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "scripted"));
            }
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl mio::Evented for TestStepStream {
        fn register(&self, _: &mio::Poll, _: mio::Token, _: mio::Ready, _: mio::PollOpt) -> io::Result<()> {
            Ok(())
        }
        fn reregister(&self, _: &mio::Poll, _: mio::Token, _: mio::Ready, _: mio::PollOpt) -> io::Result<()> {
            Ok(())
        }
        fn deregister(&self, _: &mio::Poll) -> io::Result<()> {
            Ok(())
        }
    }

    /// Records registrations and raised events for assertions.
    pub struct TestPipeContext {
        pub registrations: usize,
        pub reregistrations: usize,
        pub deregistrations: usize,
        pub events: Vec<Event>,
        timers: TimerSet,
        pub scheduled: usize,
        pub cancelled: usize
    }

    impl TestPipeContext {
        pub fn new() -> TestPipeContext {
            TestPipeContext {
                registrations: 0,
                reregistrations: 0,
                deregistrations: 0,
                events: Vec::new(),
                timers: TimerSet::new(),
                scheduled: 0,
                cancelled: 0
            }
        }

        pub fn event_names(&self) -> Vec<&'static str> {
            self.events.iter().map(|e| e.name()).collect()
        }

        pub fn take_messages(&mut self) -> Vec<Message> {
            let mut msgs = Vec::new();
            for evt in self.events.drain(..) {
                if let Event::Received(msg) = evt {
                    msgs.push(msg);
                }
            }
            msgs
        }
    }

    impl Context for TestPipeContext {
        fn register(&mut self, _: &dyn mio::Evented, _: mio::Ready, _: mio::PollOpt) -> io::Result<()> {
            self.registrations += 1;
            Ok(())
        }
        fn reregister(&mut self, _: &dyn mio::Evented, _: mio::Ready, _: mio::PollOpt) -> io::Result<()> {
            self.reregistrations += 1;
            Ok(())
        }
        fn deregister(&mut self, _: &dyn mio::Evented) -> io::Result<()> {
            self.deregistrations += 1;
            Ok(())
        }
        fn raise(&mut self, evt: Event) {
            self.events.push(evt);
        }
        fn schedule(&mut self, delay: Duration) -> io::Result<Scheduled> {
            self.scheduled += 1;
            Ok(self.timers.schedule(delay, Task::CancelSend(crate::global::SocketId(0))))
        }
        fn cancel(&mut self, handle: Scheduled) {
            self.cancelled += 1;
            self.timers.cancel(&handle);
        }
    }

    #[test]
    fn handshake_carries_the_protocol_id() {
        let handshake = super::create_handshake(crate::SocketType::Pull.id());

        assert_eq!([0, 83, 80, 0, 0, 81, 0, 0], handshake);
    }

    #[test]
    fn handshake_is_checked_against_the_peer_protocol() {
        let pids = (crate::SocketType::Push.id(), crate::SocketType::Pull.id());
        let good = super::create_handshake(crate::SocketType::Pull.id());
        let bad = super::create_handshake(crate::SocketType::Pub.id());

        assert!(super::check_handshake(pids, &good).is_ok());
        assert!(super::check_handshake(pids, &bad).is_err());
    }
}
