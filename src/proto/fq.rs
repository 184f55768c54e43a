// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::collections::HashMap;

use crate::global::EndpointId;
use crate::message::Message;

use super::priolist::Priolist;

/// Inbound fair queue: pipes holding a completed message, drained
/// round-robin in receive-priority order. Each pipe buffers at most one
/// message, which is what keeps the queue bounded.
pub struct FairQueue {
    prio: Priolist,
    msgs: HashMap<EndpointId, Message>
}

impl FairQueue {
    pub fn new() -> FairQueue {
        FairQueue {
            prio: Priolist::new(),
            msgs: HashMap::new()
        }
    }

    pub fn add(&mut self, eid: EndpointId, priority: u8) {
        self.prio.insert(eid, priority);
    }

    /// Forgets the pipe, dropping any buffered message.
    pub fn remove(&mut self, eid: EndpointId) -> Option<Message> {
        self.prio.remove(eid);
        self.msgs.remove(&eid)
    }

    /// Buffers the message a pipe just completed and marks the pipe ready.
    pub fn push(&mut self, eid: EndpointId, msg: Message) {
        self.msgs.insert(eid, msg);
        self.prio.activate(eid);
    }

    /// Takes the next buffered message; the pipe should then be told to
    /// read its next one.
    pub fn pop(&mut self) -> Option<(EndpointId, Message)> {
        let eid = self.prio.pop()?;
        self.msgs.remove(&eid).map(|msg| (eid, msg))
    }

    pub fn can_recv(&self) -> bool {
        self.prio.is_ready()
    }
}

impl Default for FairQueue {
    fn default() -> Self {
        FairQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_drain_round_robin() {
        let mut fq = FairQueue::new();

        fq.add(EndpointId(1), 8);
        fq.add(EndpointId(2), 8);
        fq.push(EndpointId(1), Message::with_body(vec![1]));
        fq.push(EndpointId(2), Message::with_body(vec![2]));

        let (first, msg) = fq.pop().unwrap();
        assert_eq!(EndpointId(1), first);
        assert_eq!(&[1], msg.get_body());

        fq.push(EndpointId(1), Message::with_body(vec![3]));

        let (second, _) = fq.pop().unwrap();
        assert_eq!(EndpointId(2), second);
        assert!(fq.can_recv());
    }
}
