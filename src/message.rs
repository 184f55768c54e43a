// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};

/// Storage of a message body.
///
/// Bodies start their life as plain owned vectors; when a protocol needs to
/// hand the same payload to several pipes (broadcast), the body is promoted
/// to shared storage so that cloning only bumps a reference count.
#[derive(Debug, Clone)]
pub enum Buffer {
    Exclusive(Vec<u8>),
    Shared(Arc<Vec<u8>>)
}

impl Buffer {
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match *self {
            Buffer::Exclusive(ref v) => v,
            Buffer::Shared(ref v) => v
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        match self {
            Buffer::Exclusive(v) => v,
            Buffer::Shared(v) => Arc::try_unwrap(v).unwrap_or_else(|v| v.as_ref().clone())
        }
    }

    fn to_mut(&mut self) -> &mut Vec<u8> {
        if let Buffer::Shared(ref v) = *self {
            let owned = v.as_ref().clone();
            *self = Buffer::Exclusive(owned);
        }
        match *self {
            Buffer::Exclusive(ref mut v) => v,
            Buffer::Shared(_) => unreachable!()
        }
    }
}

/// A message exchanged between sockets.
///
/// The header holds protocol information (request ids, backtraces) that is
/// grown and trimmed as the message traverses protocol layers; the body is
/// the application payload. On the wire both parts travel as a single
/// length-prefixed unit; on receive everything lands in the body and the
/// protocol splits its header back off the front.
#[derive(Debug, Clone)]
pub struct Message {
    header: Vec<u8>,
    body: Buffer
}

impl Message {
    pub fn new() -> Message {
        Message::with_body(Vec::new())
    }

    pub fn with_body(body: Vec<u8>) -> Message {
        Message {
            header: Vec::new(),
            body: Buffer::Exclusive(body)
        }
    }

    pub fn with_header_and_body(header: Vec<u8>, body: Vec<u8>) -> Message {
        Message {
            header,
            body: Buffer::Exclusive(body)
        }
    }

    /// Total length of the framed payload: header plus body.
    pub fn len(&self) -> usize {
        self.header.len() + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_header(&self) -> &[u8] {
        &self.header
    }

    pub fn get_body(&self) -> &[u8] {
        self.body.as_slice()
    }

    /// Consumes the message and returns the body, dropping the header.
    pub fn to_buffer(self) -> Vec<u8> {
        self.body.into_vec()
    }

    pub fn set_header(&mut self, header: Vec<u8>) {
        self.header = header;
    }

    pub fn take_header(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.header)
    }

    pub fn clear_header(&mut self) {
        self.header.clear();
    }

    /// Promotes the body to shared storage so clones are cheap.
    pub fn share(&mut self) {
        if let Buffer::Exclusive(ref mut v) = self.body {
            let owned = std::mem::take(v);
            self.body = Buffer::Shared(Arc::new(owned));
        }
    }

    /// Prepends a 32 bit big-endian word to the header.
    pub fn push_header_u32(&mut self, value: u32) {
        let mut header = vec![0u8; 4];
        BigEndian::write_u32(&mut header, value);
        header.extend_from_slice(&self.header);
        self.header = header;
    }

    /// Removes the leading 32 bit big-endian word from the header.
    pub fn pop_header_u32(&mut self) -> Option<u32> {
        if self.header.len() < 4 {
            return None;
        }
        let value = BigEndian::read_u32(&self.header[..4]);
        self.header.drain(..4);
        Some(value)
    }

    /// Moves the leading 32 bit word of the body to the end of the header,
    /// the way protocol headers are recovered from a received frame.
    /// Returns the moved word.
    pub fn body_word_to_header(&mut self) -> Option<u32> {
        if self.body.len() < 4 {
            return None;
        }
        let value = {
            let body = self.body.to_mut();
            let value = BigEndian::read_u32(&body[..4]);
            body.drain(..4);
            value
        };
        let mut word = [0u8; 4];
        BigEndian::write_u32(&mut word, value);
        self.header.extend_from_slice(&word);
        Some(value)
    }
}

impl Default for Message {
    fn default() -> Self {
        Message::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_covers_header_and_body() {
        let msg = Message::with_header_and_body(vec![0, 0, 0, 1], vec![65, 66, 67]);

        assert_eq!(7, msg.len());
        assert_eq!(&[0, 0, 0, 1], msg.get_header());
        assert_eq!(&[65, 66, 67], msg.get_body());
    }

    #[test]
    fn shared_bodies_survive_clones() {
        let mut msg = Message::with_body(vec![1, 2, 3]);

        msg.share();
        let other = msg.clone();
        drop(msg);

        assert_eq!(vec![1, 2, 3], other.to_buffer());
    }

    #[test]
    fn header_words_stack_in_front() {
        let mut msg = Message::with_body(vec![]);

        msg.push_header_u32(1);
        msg.push_header_u32(2);

        assert_eq!(Some(2), msg.pop_header_u32());
        assert_eq!(Some(1), msg.pop_header_u32());
        assert_eq!(None, msg.pop_header_u32());
    }

    #[test]
    fn body_words_move_to_header_in_order() {
        let mut msg = Message::with_body(vec![0, 0, 0, 9, 0x80, 0, 0, 1, 42]);

        assert_eq!(Some(9), msg.body_word_to_header());
        assert_eq!(Some(0x80000001), msg.body_word_to_header());
        assert_eq!(None, msg.body_word_to_header());
        assert_eq!(&[0, 0, 0, 9, 0x80, 0, 0, 1], msg.get_header());
        assert_eq!(&[42], msg.get_body());
    }
}
