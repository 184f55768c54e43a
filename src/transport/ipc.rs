// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::fs;
use std::io;

use log::debug;
use mio_uds::{UnixListener, UnixStream};

use super::acceptor::{self, Acceptor};
use super::pipe::Pipe;
use super::stream::{self, StepStream};
use super::{Destination, Transport};

pub struct Ipc;

impl StepStream for UnixStream {
}

impl Transport for Ipc {
    fn connect(&self, dest: &Destination) -> io::Result<Box<dyn Pipe>> {
        let stream = UnixStream::connect(&dest.addr)?;

        Ok(Box::new(stream::Pipe::new(stream, dest.pids, dest.recv_max_size)))
    }

    fn bind(&self, dest: &Destination) -> io::Result<Box<dyn Acceptor>> {
        // a leftover socket file from a previous run would fail the bind
        match fs::remove_file(&dest.addr) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e)
        }

        let listener = UnixListener::bind(&dest.addr)?;

        debug!("ipc listener bound to '{}'", dest.addr);
        Ok(Box::new(IpcAcceptor::new(listener, dest.clone())))
    }
}

pub struct IpcAcceptor {
    listener: UnixListener,
    dest: Destination
}

impl IpcAcceptor {
    fn new(listener: UnixListener, dest: Destination) -> IpcAcceptor {
        IpcAcceptor { listener, dest }
    }

    fn accept_all(&mut self) -> io::Result<Vec<Box<dyn Pipe>>> {
        let mut pipes: Vec<Box<dyn Pipe>> = Vec::new();

        loop {
            match self.listener.accept() {
                Ok(Some((stream, _))) => {
                    pipes.push(Box::new(stream::Pipe::new(
                        stream,
                        self.dest.pids,
                        self.dest.recv_max_size)));
                }
                Ok(None) => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e)
            }
        }

        Ok(pipes)
    }
}

impl Acceptor for IpcAcceptor {
    fn open(&mut self, ctx: &mut dyn acceptor::Context) {
        if let Err(e) = ctx.register(&self.listener, mio::Ready::readable(), mio::PollOpt::level()) {
            ctx.raise(acceptor::Event::Error(e));
        }
    }

    fn close(&mut self, ctx: &mut dyn acceptor::Context) {
        let _ = ctx.deregister(&self.listener);
        let _ = fs::remove_file(&self.dest.addr);
    }

    fn ready(&mut self, ctx: &mut dyn acceptor::Context, events: mio::Ready) {
        if !events.is_readable() {
            return;
        }
        match self.accept_all() {
            Ok(pipes) => {
                if !pipes.is_empty() {
                    ctx.raise(acceptor::Event::Accepted(pipes));
                }
            }
            Err(e) => ctx.raise(acceptor::Event::Error(e))
        }
    }
}
