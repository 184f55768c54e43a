// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;

use crate::global::{EndpointId, SocketId};
use crate::reactor::{EndpointRequest, Request, WorkerSender};

/// One bind or connect of a socket. Dropping the handle leaves the endpoint
/// alive; `shutdown` stops it without touching the rest of the socket.
#[derive(Debug)]
pub struct Endpoint {
    sid: SocketId,
    eid: EndpointId,
    sender: WorkerSender
}

impl Endpoint {
    pub(crate) fn new(sid: SocketId, eid: EndpointId, sender: WorkerSender) -> Endpoint {
        Endpoint { sid, eid, sender }
    }

    pub fn id(&self) -> usize {
        self.eid.0
    }

    pub fn shutdown(self) -> io::Result<()> {
        self.sender.send(Request::Endpoint(self.sid, self.eid, EndpointRequest::Close))
    }
}
