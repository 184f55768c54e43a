// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;
use std::net::SocketAddr;

use log::debug;
use mio::net::{TcpListener, TcpStream};
use net2::TcpBuilder;

use super::acceptor::{self, Acceptor};
use super::pipe::Pipe;
use super::stream::{self, StepStream};
use super::{addr, Destination, Transport};

pub struct Tcp;

impl StepStream for TcpStream {
}

impl Transport for Tcp {
    fn connect(&self, dest: &Destination) -> io::Result<Box<dyn Pipe>> {
        let parsed = addr::parse(&dest.addr, dest.ipv4only)?;

        // the connect is non-blocking: the pipe learns the outcome
        // from readiness events, or from the handshake deadline
        let stream = match parsed.local {
            None => TcpStream::connect(&parsed.remote)?,
            Some(local_ip) => {
                let builder = if parsed.remote.is_ipv4() {
                    TcpBuilder::new_v4()?
                } else {
                    TcpBuilder::new_v6()?
                };
                builder.bind(SocketAddr::new(local_ip, 0))?;
                let std_stream = builder.to_tcp_stream()?;
                TcpStream::connect_stream(std_stream, &parsed.remote)?
            }
        };

        configure(&stream, dest)?;

        Ok(Box::new(stream::Pipe::new(stream, dest.pids, dest.recv_max_size)))
    }

    fn bind(&self, dest: &Destination) -> io::Result<Box<dyn Acceptor>> {
        let parsed = addr::parse(&dest.addr, dest.ipv4only)?;
        let listener = TcpListener::bind(&parsed.remote)?;

        debug!("tcp listener bound to '{}'", dest.addr);
        Ok(Box::new(TcpAcceptor::new(listener, dest.clone())))
    }
}

fn configure(stream: &TcpStream, dest: &Destination) -> io::Result<()> {
    if dest.tcp_nodelay {
        stream.set_nodelay(true)?;
    }
    stream.set_send_buffer_size(dest.send_buffer)?;
    stream.set_recv_buffer_size(dest.recv_buffer)?;
    Ok(())
}

pub struct TcpAcceptor {
    listener: TcpListener,
    dest: Destination
}

impl TcpAcceptor {
    fn new(listener: TcpListener, dest: Destination) -> TcpAcceptor {
        TcpAcceptor { listener, dest }
    }

    fn accept_all(&mut self) -> io::Result<Vec<Box<dyn Pipe>>> {
        let mut pipes: Vec<Box<dyn Pipe>> = Vec::new();

        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    configure(&stream, &self.dest)?;
                    pipes.push(Box::new(stream::Pipe::new(
                        stream,
                        self.dest.pids,
                        self.dest.recv_max_size)));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e)
            }
        }

        Ok(pipes)
    }
}

impl Acceptor for TcpAcceptor {
    fn open(&mut self, ctx: &mut dyn acceptor::Context) {
        if let Err(e) = ctx.register(&self.listener, mio::Ready::readable(), mio::PollOpt::level()) {
            ctx.raise(acceptor::Event::Error(e));
        }
    }

    fn close(&mut self, ctx: &mut dyn acceptor::Context) {
        let _ = ctx.deregister(&self.listener);
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
