// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Spool is an implementation of the scalability protocols: a small family
//! of messaging patterns (request/reply, publish/subscribe, push/pull,
//! survey, bus, pair) exchanging discrete length-delimited messages over
//! pluggable transports (`tcp`, `ipc`, `inproc`).
//!
//! A [Session](struct.Session.html) owns a pool of worker threads running
//! the I/O event loops; each [Socket](struct.Socket.html) created from it is
//! pinned to one worker and drives its protocol and connection state
//! machines there, while the calling thread blocks only in the facade.
//!
//! ```no_run
//! use spool::{Session, SocketType};
//!
//! let session = Session::new().unwrap();
//! let mut pull = session.create_socket(SocketType::Pull).unwrap();
//! let mut push = session.create_socket(SocketType::Push).unwrap();
//!
//! pull.bind("tcp://127.0.0.1:5454").unwrap();
//! push.connect("tcp://127.0.0.1:5454").unwrap();
//!
//! push.send(vec![65, 66, 67]).unwrap();
//! let received = pull.recv().unwrap();
//! assert_eq!(vec![65, 66, 67], received);
//! ```

mod core;
mod facade;
mod global;
mod io_error;
mod message;
mod proto;
mod reactor;
mod transport;
mod util;

pub use crate::core::config::{OptionKind, OptionValue, SocketOption};
pub use crate::facade::device::{device, loopback_device};
pub use crate::facade::endpoint::Endpoint;
pub use crate::facade::session::{Session, MAX_SOCKETS};
pub use crate::facade::socket::Socket;
pub use crate::global::{Domain, SocketType};
pub use crate::message::{Buffer, Message};
