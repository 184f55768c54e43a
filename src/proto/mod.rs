// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The scalability protocols. Each one is a state machine over the set of
//! attached pipes, built from the shared policies: fair queue and load
//! balance (priority round-robin), distribution (broadcast) and the
//! subscription trie. The raw variants keep the wire headers exposed and
//! drop the end-to-end state, so devices can forward their traffic.

pub mod dist;
pub mod fq;
pub mod lb;
pub mod priolist;
pub mod trie;

mod bus;
mod pair;
mod publ;
mod pull;
mod push;
mod rep;
mod req;
mod resp;
mod sub;
mod surv;

use std::io;
use std::sync::mpsc::Sender;

use log::error;

use crate::core::config::SocketOption;
use crate::core::context::Scope;
use crate::core::endpoint::Pipe;
use crate::core::socket::Reply;
use crate::global::{Domain, EndpointId, SocketType};
use crate::io_error::invalid_input_io_error;
use crate::message::Message;
use crate::reactor::Scheduled;

/// Cancellation handle of the pending user operation, if one was armed.
pub type Timeout = Option<Scheduled>;

/// The surface a protocol presents to its socket. Pipes are owned by the
/// protocol once attached; readiness, completion and timer events are routed
/// here by the socket.
pub trait Protocol {
    fn id(&self) -> u16;
    fn peer_id(&self) -> u16;

    /// Takes ownership of a freshly created pipe.
    /// A protocol may refuse a pipe it cannot accommodate.
    fn add_pipe(&mut self, scope: &mut Scope, pipe: Pipe) -> io::Result<()>;
    fn remove_pipe(&mut self, scope: &mut Scope, eid: EndpointId) -> Option<Pipe>;
    fn open_pipe(&mut self, scope: &mut Scope, eid: EndpointId);
    fn ready(&mut self, scope: &mut Scope, eid: EndpointId, events: mio::Ready);
    fn on_pipe_timeout(&mut self, scope: &mut Scope, eid: EndpointId);

    fn on_pipe_opened(&mut self, scope: &mut Scope, eid: EndpointId);
    fn on_pipe_can_send(&mut self, scope: &mut Scope, eid: EndpointId);
    fn on_send_done(&mut self, scope: &mut Scope, eid: EndpointId);
    fn on_recv_done(&mut self, scope: &mut Scope, eid: EndpointId, msg: Message);

    fn send(&mut self, scope: &mut Scope, msg: Message, timeout: Timeout);
    fn on_send_timeout(&mut self, scope: &mut Scope);
    fn recv(&mut self, scope: &mut Scope, timeout: Timeout);
    fn on_recv_timeout(&mut self, scope: &mut Scope);

    fn on_resend_timer(&mut self, _scope: &mut Scope) {
    }
    fn on_survey_deadline(&mut self, _scope: &mut Scope) {
    }

    /// Socket-level readiness, feeding the non-blocking operations and the
    /// notification descriptors.
    fn ready_to_send(&self) -> bool;
    fn ready_to_recv(&self) -> bool;

    /// True while a pipe is still flushing a message, which is what the
    /// linger on close waits for.
    fn has_pending_send(&self) -> bool;

    fn set_option(&mut self, option: &SocketOption) -> io::Result<()> {
        let _ = option;
        Err(invalid_input_io_error("option not supported by the protocol"))
    }

    /// Fails any parked user operation with the terminated error.
    fn abort_pending(&mut self, scope: &mut Scope);

    /// Hands every pipe back for teardown.
    fn destroy(&mut self, scope: &mut Scope) -> Vec<Pipe>;
}

pub fn create_protocol(socket_type: SocketType,
                       domain: Domain,
                       reply_tx: Sender<Reply>) -> Box<dyn Protocol> {
    let raw = domain.is_raw();

    match socket_type {
        SocketType::Pair => Box::new(pair::Pair::new(reply_tx)),
        SocketType::Pub => Box::new(publ::Pub::new(reply_tx)),
        SocketType::Sub => Box::new(sub::Sub::new(reply_tx, raw)),
        SocketType::Req => {
            if raw {
                Box::new(req::XReq::new(reply_tx))
            } else {
                Box::new(req::Req::new(reply_tx))
            }
        }
        SocketType::Rep => {
            if raw {
                Box::new(rep::Rep::new_raw(reply_tx))
            } else {
                Box::new(rep::Rep::new(reply_tx))
            }
        }
        SocketType::Push => Box::new(push::Push::new(reply_tx)),
        SocketType::Pull => Box::new(pull::Pull::new(reply_tx)),
        SocketType::Surveyor => {
            if raw {
                Box::new(surv::XSurveyor::new(reply_tx))
            } else {
                Box::new(surv::Surveyor::new(reply_tx))
            }
        }
        SocketType::Respondent => {
            if raw {
                Box::new(resp::Respondent::new_raw(reply_tx))
            } else {
                Box::new(resp::Respondent::new(reply_tx))
            }
        }
        SocketType::Bus => {
            if raw {
                Box::new(bus::XBus::new(reply_tx))
            } else {
                Box::new(bus::Bus::new(reply_tx))
            }
        }
    }
}

/// Reports an operation outcome to the facade.
pub(crate) fn notify(reply_tx: &Sender<Reply>, reply: Reply) {
    if reply_tx.send(reply).is_err() {
        error!("failed to notify the facade: channel closed");
    }
}

pub(crate) fn clear_timeout(scope: &mut Scope, timeout: Timeout) {
    if let Some(handle) = timeout {
        scope.cancel(handle);
    }
}

/// A request or survey id: a 31 bit counter with the high bit set, so it
/// terminates a backtrace stack. Seeded randomly per socket.
pub(crate) fn initial_exchange_id() -> u32 {
    rand::random::<u32>() | 0x8000_0000
}

pub(crate) fn next_exchange_id(current: u32) -> u32 {
    (current.wrapping_add(1)) | 0x8000_0000
}

/// Moves the backtrace stack of a received frame from the body into the
/// header: hop ids up to and including the terminating exchange id (the word
/// with the high bit set). False means the frame is malformed.
pub(crate) fn restore_backtrace(msg: &mut Message) -> bool {
    loop {
        match msg.body_word_to_header() {
            Some(word) if word & 0x8000_0000 != 0 => return true,
            Some(_) => continue,
            None => return false
        }
    }
}
