// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;

use log::error;

use crate::io_error::{broken_pipe_io_error, other_io_error};
use crate::message::Message;
use crate::transport::pipe::{Context, Event};

use super::dead::Dead;
use super::recv::RecvOperation;
use super::send::SendOperation;
use super::{is_dead_event, PipeState, StepStream};

/// Handshaken connection carrying framed messages.
///
/// At most one send and one receive operation are in flight at a time. A
/// completed receive is announced with `Received` and the next one only
/// starts when the owner asks for it, which is what bounds the per-pipe
/// inbound buffering to a single message.
pub struct Active<T : StepStream + 'static> {
    stream: T,
    recv_max_size: Option<u64>,
    sending: Option<SendOperation>,
    receiving: Option<RecvOperation>,
    interest: mio::Ready
}

impl<T : StepStream> Active<T> {
    pub fn new(stream: T, recv_max_size: Option<u64>) -> Active<T> {
        Active {
            stream,
            recv_max_size,
            sending: None,
            receiving: None,
            // the handshake left the stream registered for readability
            interest: mio::Ready::readable()
        }
    }

    /// Starts reading the first message right after the handshake.
    pub fn enter(&mut self, ctx: &mut dyn Context) -> io::Result<()> {
        self.start_recv(ctx)
    }

    fn start_recv(&mut self, ctx: &mut dyn Context) -> io::Result<()> {
        let mut operation = RecvOperation::new(self.recv_max_size);

        match operation.run(&mut self.stream)? {
            Some(msg) => ctx.raise(Event::Received(msg)),
            None => self.receiving = Some(operation)
        }

        self.update_interest(ctx)
    }

    fn resume_recv(&mut self, ctx: &mut dyn Context) -> io::Result<()> {
        if let Some(mut operation) = self.receiving.take() {
            match operation.run(&mut self.stream)? {
                Some(msg) => ctx.raise(Event::Received(msg)),
                None => self.receiving = Some(operation)
            }
        }

        self.update_interest(ctx)
    }

    fn start_send(&mut self, ctx: &mut dyn Context, msg: Message) -> io::Result<()> {
        let mut operation = SendOperation::new(msg);

        if operation.run(&mut self.stream)? {
            ctx.raise(Event::Sent);
            ctx.raise(Event::CanSend);
        } else {
            self.sending = Some(operation);
        }

        self.update_interest(ctx)
    }

    fn resume_send(&mut self, ctx: &mut dyn Context) -> io::Result<()> {
        if let Some(mut operation) = self.sending.take() {
            if operation.run(&mut self.stream)? {
                ctx.raise(Event::Sent);
                ctx.raise(Event::CanSend);
            } else {
                self.sending = Some(operation);
            }
        }

        self.update_interest(ctx)
    }

    fn update_interest(&mut self, ctx: &mut dyn Context) -> io::Result<()> {
        let mut desired = mio::Ready::empty();

        if self.receiving.is_some() {
            desired.insert(mio::Ready::readable());
        }
        if self.sending.is_some() {
            desired.insert(mio::Ready::writable());
        }

        if desired != self.interest {
            ctx.reregister(&self.stream, desired, mio::PollOpt::level())?;
            self.interest = desired;
        }

        Ok(())
    }
}

impl<T : StepStream> PipeState<T> for Active<T> {
    fn name(&self) -> &'static str {
        "Active"
    }

    fn open(self: Box<Self>, _: &mut dyn Context) -> Box<dyn PipeState<T>> {
        self
    }

    fn close(self: Box<Self>, ctx: &mut dyn Context) -> Box<dyn PipeState<T>> {
        let _ = ctx.deregister(&self.stream);
        Box::new(Dead)
    }

    fn send(mut self: Box<Self>, ctx: &mut dyn Context, msg: Message) -> Box<dyn PipeState<T>> {
        if self.sending.is_some() {
            error!("send submitted while a send is in flight");
            return self.error(ctx, other_io_error("send already in progress"));
        }

        let res = self.start_send(ctx, msg);
        match res {
            Ok(()) => self,
            Err(e) => self.error(ctx, e)
        }
    }

    fn recv(mut self: Box<Self>, ctx: &mut dyn Context) -> Box<dyn PipeState<T>> {
        if self.receiving.is_some() {
            error!("recv submitted while a recv is in flight");
            return self.error(ctx, other_io_error("recv already in progress"));
        }

        let res = self.start_recv(ctx);
        match res {
            Ok(()) => self,
            Err(e) => self.error(ctx, e)
        }
    }

    fn ready(mut self: Box<Self>, ctx: &mut dyn Context, events: mio::Ready) -> Box<dyn PipeState<T>> {
        let mut res = Ok(());

        if events.is_readable() {
            res = self.resume_recv(ctx);
        }
        if res.is_ok() && events.is_writable() {
            res = self.resume_send(ctx);
        }

        match res {
            Ok(()) => {
                // hangup with no read or write to surface it through
                if is_dead_event(events) && !events.is_readable() && !events.is_writable() {
                    self.error(ctx, broken_pipe_io_error("connection closed by peer"))
                } else {
                    self
                }
            }
            Err(e) => self.error(ctx, e)
        }
    }

    fn on_timeout(self: Box<Self>, _: &mut dyn Context) -> Box<dyn PipeState<T>> {
        self
    }
}

#[cfg(test)]
mod tests {
    use byteorder::{BigEndian, ByteOrder};

    use super::super::tests::*;
    use super::*;

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; 8];
        BigEndian::write_u64(&mut bytes, body.len() as u64);
        bytes.extend_from_slice(body);
        bytes
    }

    fn active_over(input: Vec<u8>) -> (Box<Active<TestStepStream>>, TestPipeContext) {
        let stream = TestStepStream::with_input(input);
        let active = Box::new(Active::new(stream, None));
        let ctx = TestPipeContext::new();
        (active, ctx)
    }

    #[test]
    fn buffered_message_is_received_on_entry() {
        let (mut active, mut ctx) = active_over(frame(b"ABC"));

        active.enter(&mut ctx).unwrap();

        let msgs = ctx.take_messages();
        assert_eq!(1, msgs.len());
        assert_eq!(b"ABC", msgs[0].get_body());
    }

    #[test]
    fn next_message_waits_for_the_owner_to_ask() {
        let mut input = frame(b"one");
        input.extend_from_slice(&frame(b"two"));
        let (mut active, mut ctx) = active_over(input);

        active.enter(&mut ctx).unwrap();
        assert_eq!(1, ctx.take_messages().len());

        let state: Box<dyn PipeState<TestStepStream>> = active;
        let _state = state.recv(&mut ctx);
        let msgs = ctx.take_messages();
        assert_eq!(1, msgs.len());
        assert_eq!(b"two", msgs[0].get_body());
    }

    #[test]
    fn send_completion_raises_sent_then_can_send() {
        let (mut active, mut ctx) = active_over(Vec::new());

        active.enter(&mut ctx).unwrap();
        let state: Box<dyn PipeState<TestStepStream>> = active;
        let _state = state.send(&mut ctx, Message::with_body(vec![65]));

        assert_eq!(vec!["Sent", "CanSend"], ctx.event_names());
    }
}
