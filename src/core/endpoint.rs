// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use crate::global::EndpointId;
use crate::message::Message;
use crate::transport::{acceptor, pipe};
use crate::util::backoff::Backoff;

use super::context::Scope;

/// What a bound or dialed endpoint was created from, kept for
/// reconnection and for shutdown bookkeeping.
pub struct EndpointSpec {
    pub url: String,
    pub kind: EndpointKind,
    pub backoff: Backoff
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Bind,
    Connect
}

/// A connection controller: the transport pipe plus the socket-side
/// bookkeeping the protocol relies on (priorities, one-send-in-flight).
pub struct Pipe {
    eid: EndpointId,
    inner: Box<dyn pipe::Pipe>,
    send_priority: u8,
    recv_priority: u8,
    sending: bool
}

impl Pipe {
    pub fn new(eid: EndpointId,
               inner: Box<dyn pipe::Pipe>,
               send_priority: u8,
               recv_priority: u8) -> Pipe {
        Pipe {
            eid,
            inner,
            send_priority,
            recv_priority,
            sending: false
        }
    }

    pub fn eid(&self) -> EndpointId {
        self.eid
    }

    pub fn send_priority(&self) -> u8 {
        self.send_priority
    }

    pub fn recv_priority(&self) -> u8 {
        self.recv_priority
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    /// Called when the transport acknowledged the in-flight send.
    pub fn acked_send(&mut self) {
        self.sending = false;
    }

    pub fn open(&mut self, scope: &mut Scope) {
        let mut ctx = scope.endpoint(self.eid);
        self.inner.open(&mut ctx);
    }

    pub fn close(&mut self, scope: &mut Scope) {
        let mut ctx = scope.endpoint(self.eid);
        self.inner.close(&mut ctx);
    }

    pub fn send(&mut self, scope: &mut Scope, msg: Message) {
        self.sending = true;
        let mut ctx = scope.endpoint(self.eid);
        self.inner.send(&mut ctx, msg);
    }

    pub fn recv(&mut self, scope: &mut Scope) {
        let mut ctx = scope.endpoint(self.eid);
        self.inner.recv(&mut ctx);
    }

    pub fn ready(&mut self, scope: &mut Scope, events: mio::Ready) {
        let mut ctx = scope.endpoint(self.eid);
        self.inner.ready(&mut ctx, events);
    }

    pub fn on_timeout(&mut self, scope: &mut Scope) {
        let mut ctx = scope.endpoint(self.eid);
        self.inner.on_timeout(&mut ctx);
    }
}

/// A listener controller.
pub struct Acceptor {
    eid: EndpointId,
    inner: Box<dyn acceptor::Acceptor>
}

impl Acceptor {
    pub fn new(eid: EndpointId, inner: Box<dyn acceptor::Acceptor>) -> Acceptor {
        Acceptor { eid, inner }
    }

    pub fn eid(&self) -> EndpointId {
        self.eid
    }

    pub fn open(&mut self, scope: &mut Scope) {
        let mut ctx = scope.endpoint(self.eid);
        self.inner.open(&mut ctx);
    }

    pub fn close(&mut self, scope: &mut Scope) {
        let mut ctx = scope.endpoint(self.eid);
        self.inner.close(&mut ctx);
    }

    pub fn ready(&mut self, scope: &mut Scope, events: mio::Ready) {
        let mut ctx = scope.endpoint(self.eid);
        self.inner.ready(&mut ctx, events);
    }
}
