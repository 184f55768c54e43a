// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::config::{OptionKind, OptionValue, SocketOption};
use crate::core::socket::{Reply, Request};
use crate::global::{Domain, SocketId, SocketType};
use crate::io_error::{other_io_error, terminated_io_error};
use crate::message::Message;
use crate::reactor::{self, WorkerSender};

use super::endpoint::Endpoint;
use super::session::SocketTable;

/// A messaging endpoint of one scalability protocol.
///
/// Every method posts a request to the worker the socket is pinned to and
/// blocks on the reply; `try_send`/`try_recv` come back immediately with the
/// would-block error when the protocol is not ready. Timeouts are armed on
/// the worker, so a blocking call is woken even though the caller itself
/// holds no timer.
pub struct Socket {
    id: SocketId,
    socket_type: SocketType,
    domain: Domain,
    sender: WorkerSender,
    reply_rx: Receiver<Reply>,
    table: Arc<Mutex<SocketTable>>,
    closed: bool
}

impl Socket {
    pub(crate) fn new(id: SocketId,
                      socket_type: SocketType,
                      domain: Domain,
                      sender: WorkerSender,
                      reply_rx: Receiver<Reply>,
                      table: Arc<Mutex<SocketTable>>) -> Socket {
        Socket {
            id,
            socket_type,
            domain,
            sender,
            reply_rx,
            table,
            closed: false
        }
    }

    pub fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    #[doc(hidden)]
    pub fn matches(&self, other: &Socket) -> bool {
        self.socket_type.matches(other.socket_type)
    }

    fn send_request(&self, request: Request) -> io::Result<()> {
        self.sender.send(reactor::Request::Socket(self.id, request))
    }

    fn recv_reply(&self) -> io::Result<Reply> {
        self.reply_rx.recv().map_err(|_| terminated_io_error())
    }

    /// Adds a remote endpoint to the socket; the library keeps trying to
    /// reach it, reconnecting with backoff after every failure. The address
    /// is `scheme://address` with schemes `tcp`, `ipc` and `inproc`. Name
    /// resolution happens before this returns. Bind and connect may be
    /// called many times on the same socket, so one socket can speak to
    /// many heterogeneous endpoints.
    pub fn connect(&mut self, addr: &str) -> io::Result<Endpoint> {
        self.send_request(Request::Connect(addr.to_owned()))?;

        match self.recv_reply()? {
            Reply::Connected(eid) => Ok(Endpoint::new(self.id, eid, self.sender.clone())),
            Reply::NotConnected(e) => Err(e),
            _ => Err(other_io_error("unexpected reply"))
        }
    }

    /// Adds a local endpoint other sockets can reach.
    pub fn bind(&mut self, addr: &str) -> io::Result<Endpoint> {
        self.send_request(Request::Bind(addr.to_owned()))?;

        match self.recv_reply()? {
            Reply::Bound(eid) => Ok(Endpoint::new(self.id, eid, self.sender.clone())),
            Reply::NotBound(e) => Err(e),
            _ => Err(other_io_error("unexpected reply"))
        }
    }

    pub fn send(&mut self, buffer: Vec<u8>) -> io::Result<()> {
        self.send_msg(Message::with_body(buffer))
    }

    pub fn send_msg(&mut self, msg: Message) -> io::Result<()> {
        self.do_send(msg, false)
    }

    /// Non-blocking send; the would-block error means the protocol cannot
    /// take the message right now.
    pub fn try_send(&mut self, buffer: Vec<u8>) -> io::Result<()> {
        self.try_send_msg(Message::with_body(buffer))
    }

    pub fn try_send_msg(&mut self, msg: Message) -> io::Result<()> {
        self.do_send(msg, true)
    }

    fn do_send(&mut self, msg: Message, nonblocking: bool) -> io::Result<()> {
        self.send_request(Request::Send(msg, nonblocking))?;

        match self.recv_reply()? {
            Reply::MsgSent => Ok(()),
            Reply::MsgNotSent(e) => Err(e),
            _ => Err(other_io_error("unexpected reply"))
        }
    }

    pub fn recv(&mut self) -> io::Result<Vec<u8>> {
        self.recv_msg().map(|msg| msg.to_buffer())
    }

    pub fn recv_msg(&mut self) -> io::Result<Message> {
        self.do_recv(false)
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> io::Result<Vec<u8>> {
        self.try_recv_msg().map(|msg| msg.to_buffer())
    }

    pub fn try_recv_msg(&mut self) -> io::Result<Message> {
        self.do_recv(true)
    }

    fn do_recv(&mut self, nonblocking: bool) -> io::Result<Message> {
        self.send_request(Request::Recv(nonblocking))?;

        match self.recv_reply()? {
            Reply::MsgRecv(msg) => Ok(msg),
            Reply::MsgNotRecv(e) => Err(e),
            _ => Err(other_io_error("unexpected reply"))
        }
    }

    /// Sets a socket option.
    /// See [SocketOption](enum.SocketOption.html) for the list of options.
    pub fn set_option(&mut self, option: SocketOption) -> io::Result<()> {
        self.send_request(Request::SetOption(option))?;

        match self.recv_reply()? {
            Reply::OptionSet => Ok(()),
            Reply::OptionNotSet(e) => Err(e),
            _ => Err(other_io_error("unexpected reply"))
        }
    }

    pub fn get_option(&mut self, kind: OptionKind) -> io::Result<OptionValue> {
        self.send_request(Request::GetOption(kind))?;

        match self.recv_reply()? {
            Reply::OptionRetrieved(value) => Ok(value),
            Reply::OptionNotRetrieved(e) => Err(e),
            _ => Err(other_io_error("unexpected reply"))
        }
    }

    pub fn set_send_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_option(SocketOption::SendTimeout(Some(timeout)))
    }

    pub fn set_recv_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_option(SocketOption::RecvTimeout(Some(timeout)))
    }

    pub fn set_send_priority(&mut self, priority: u8) -> io::Result<()> {
        self.set_option(SocketOption::SendPriority(priority))
    }

    pub fn set_recv_priority(&mut self, priority: u8) -> io::Result<()> {
        self.set_option(SocketOption::RecvPriority(priority))
    }

    pub fn set_linger(&mut self, linger: Option<Duration>) -> io::Result<()> {
        self.set_option(SocketOption::Linger(linger))
    }

    pub fn set_recv_max_size(&mut self, max: Option<u64>) -> io::Result<()> {
        self.set_option(SocketOption::RecvMaxSize(max))
    }

    pub fn set_resend_interval(&mut self, interval: Duration) -> io::Result<()> {
        self.set_option(SocketOption::ResendInterval(interval))
    }

    pub fn set_survey_deadline(&mut self, deadline: Duration) -> io::Result<()> {
        self.set_option(SocketOption::SurveyDeadline(deadline))
    }

    pub fn subscribe(&mut self, topic: &str) -> io::Result<()> {
        self.set_option(SocketOption::Subscribe(topic.to_owned()))
    }

    pub fn unsubscribe(&mut self, topic: &str) -> io::Result<()> {
        self.set_option(SocketOption::Unsubscribe(topic.to_owned()))
    }

    /// Descriptor that polls readable while the socket can send without
    /// blocking; for integration with external event loops. Poll it only,
    /// reading from it corrupts the readiness flag.
    pub fn send_fd(&mut self) -> io::Result<RawFd> {
        match self.get_option(OptionKind::SendFd)? {
            OptionValue::Fd(fd) => Ok(fd),
            _ => Err(other_io_error("unexpected reply"))
        }
    }

    /// Descriptor that polls readable while the socket can receive without
    /// blocking.
    pub fn recv_fd(&mut self) -> io::Result<RawFd> {
        match self.get_option(OptionKind::RecvFd)? {
            OptionValue::Fd(fd) => Ok(fd),
            _ => Err(other_io_error("unexpected reply"))
        }
    }

    /// Ordered shutdown: endpoints are stopped, outbound data is drained up
    /// to the linger bound, then the socket id is released.
    pub fn close(mut self) -> io::Result<()> {
        self.do_close()
    }

    fn do_close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = self.send_request(Request::Close).and_then(|_| {
            loop {
                match self.recv_reply()? {
                    Reply::Closed => return Ok(()),
                    // replies of operations aborted by the close
                    _ => continue
                }
            }
        });

        self.table.lock().unwrap().release(self.id);
        result
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.send_request(Request::Close);
            self.table.lock().unwrap().release(self.id);
        }
    }
}
