// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Defines the socket types, which in turn determines the exact semantics of the socket.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SocketType {
    /// **One-to-one protocol**
    /// Socket for communication with exactly one peer.
    /// Each party can send messages at any time.
    /// If the peer is not available or its receive buffer is full,
    /// subsequent sends will block until it is possible to send the message.
    Pair       = (    16),

    /// **Publish/subscribe protocol**
    /// This socket is used to distribute messages to multiple destinations.
    /// The topic is an arbitrary sequence of bytes at the beginning of the message body;
    /// filtering happens on the subscriber side, so every message is sent to every peer.
    /// Receive operation is not defined.
    Pub        = (2 * 16),

    /// Receives messages from the publisher.
    /// Only messages whose body starts with a subscribed topic are received;
    /// a zero-length topic matches any message.
    /// When the socket is created there are no subscriptions.
    /// Send operation is not defined on this socket.
    Sub        = (2 * 16) + 1,

    /// **Request/reply protocol**
    /// Used to implement the client that sends requests and receives replies.
    /// The last request is resent periodically until its reply arrives,
    /// so the exchange survives the loss of a worker.
    Req        = (3 * 16),

    /// Used to implement the stateless worker that receives requests and sends replies.
    Rep        = (3 * 16) + 1,

    /// **Pipeline protocol**
    /// This socket is used to send messages to a cluster of load-balanced nodes.
    /// Receive operation is not defined on this socket type.
    Push       = (5 * 16),

    /// This socket is used to receive a message from a cluster of nodes,
    /// fair-queued across the connected peers.
    /// Send operation is not defined on this socket type.
    Pull       = (5 * 16) + 1,

    /// **Survey protocol**
    /// Used to send the survey. The survey is delivered to all connected respondents.
    /// Once the query is sent, the socket can be used to receive the responses
    /// until the survey deadline expires; after that, receive fails.
    Surveyor   = (6 * 16) + 2,

    /// Used to respond to a survey.
    /// The survey is received with the receive function,
    /// the response is sent back with the send function.
    Respondent = (6 * 16) + 3,

    /// **Message bus protocol**
    /// Sent messages are distributed to all the other nodes in the topology,
    /// incoming messages are fair-queued.
    /// The socket never receives messages that it sent itself.
    Bus        = (7 * 16)
}

impl SocketType {
    pub fn id(&self) -> u16 {
        *self as u16
    }

    pub fn peer(&self) -> SocketType {
        match *self {
            SocketType::Pair       => SocketType::Pair,
            SocketType::Pub        => SocketType::Sub,
            SocketType::Sub        => SocketType::Pub,
            SocketType::Req        => SocketType::Rep,
            SocketType::Rep        => SocketType::Req,
            SocketType::Push       => SocketType::Pull,
            SocketType::Pull       => SocketType::Push,
            SocketType::Surveyor   => SocketType::Respondent,
            SocketType::Respondent => SocketType::Surveyor,
            SocketType::Bus        => SocketType::Bus,
        }
    }

    pub fn matches(&self, other: SocketType) -> bool {
        self.peer() == other && other.peer() == *self
    }
}

/// Domain of a socket: regular sockets implement the full semantics of their
/// protocol, raw sockets skip the end-to-end state keeping and expose the
/// protocol header, so they can be used to build intermediary devices.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Domain {
    Sp,
    SpRaw
}

impl Domain {
    pub fn is_raw(&self) -> bool {
        *self == Domain::SpRaw
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct SocketId(pub usize);

impl fmt::Debug for SocketId {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

/// Identifies an endpoint within a socket: a bound listener, a dialed
/// connection, or a connection accepted by a listener.
/// Endpoint ids double as the poll token of the underlying resource,
/// so they are unique within a worker, not just within a socket.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub usize);

impl EndpointId {
    pub fn token(&self) -> mio::Token {
        mio::Token(self.0)
    }
}

impl fmt::Debug for EndpointId {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

impl From<mio::Token> for EndpointId {
    fn from(tok: mio::Token) -> EndpointId {
        EndpointId(tok.0)
    }
}

#[derive(Clone)]
pub struct IdSequence {
    value: Rc<Cell<usize>>
}

impl IdSequence {
    pub fn new() -> IdSequence {
        IdSequence { value: Rc::new(Cell::new(0)) }
    }

    pub fn next(&self) -> usize {
        let id = self.value.get();

        self.value.set(id + 1);
        id
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        IdSequence::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{IdSequence, SocketType};

    #[test]
    fn id_sequence_can_be_cloned() {
        let seq = IdSequence::new();
        let other = seq.clone();

        assert_eq!(0, other.next());
        assert_eq!(1, seq.next());
        assert_eq!(2, seq.next());
        assert_eq!(3, other.next());
    }

    #[test]
    fn socket_types_match_their_peer() {
        assert!(SocketType::Push.matches(SocketType::Pull));
        assert!(SocketType::Pair.matches(SocketType::Pair));
        assert!(SocketType::Bus.matches(SocketType::Bus));
        assert!(!SocketType::Req.matches(SocketType::Sub));
    }
}
