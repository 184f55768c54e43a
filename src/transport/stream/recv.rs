// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io::{self, Read};

use byteorder::{BigEndian, ByteOrder};

use crate::io_error::invalid_data_io_error;
use crate::message::Message;

use super::map_non_block;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Step {
    Prefix,
    Payload,
    Done
}

/// Resumable read of one framed message: the 64 bit length prefix, then the
/// payload. A length above the receive cap fails the operation before any
/// payload byte is consumed.
pub struct RecvOperation {
    step: Step,
    read: usize,
    prefix: [u8; 8],
    msg_len: u64,
    max_size: Option<u64>,
    buffer: Option<Vec<u8>>
}

impl RecvOperation {
    pub fn new(max_size: Option<u64>) -> RecvOperation {
        RecvOperation {
            step: Step::Prefix,
            read: 0,
            prefix: [0u8; 8],
            msg_len: 0,
            max_size,
            buffer: None
        }
    }

    /// Makes as much progress as the stream allows.
    /// Ok(Some(msg)) once a whole message is in, Ok(None) on would-block.
    pub fn run<S : Read>(&mut self, stream: &mut S) -> io::Result<Option<Message>> {
        if self.step == Step::Prefix {
            while self.read < self.prefix.len() {
                let slot = self.read;
                match RecvOperation::read_some(stream, &mut self.prefix[slot..])? {
                    Some(n) => self.read += n,
                    None => return Ok(None)
                }
            }

            self.msg_len = BigEndian::read_u64(&self.prefix);
            if let Some(max) = self.max_size {
                if self.msg_len > max {
                    return Err(invalid_data_io_error("received message too large"));
                }
            }
            self.buffer = Some(vec![0u8; self.msg_len as usize]);
            self.step = Step::Payload;
            self.read = 0;
        }

        if self.step == Step::Payload {
            let mut buffer = self.buffer.take().unwrap();

            while (self.read as u64) < self.msg_len {
                let slot = self.read;
                match RecvOperation::read_some(stream, &mut buffer[slot..])? {
                    Some(n) => self.read += n,
                    None => {
                        self.buffer = Some(buffer);
                        return Ok(None);
                    }
                }
            }

            self.step = Step::Done;
            return Ok(Some(Message::with_body(buffer)));
        }

        Err(invalid_data_io_error("recv operation already completed"))
    }

    fn read_some<S : Read>(stream: &mut S, buffer: &mut [u8]) -> io::Result<Option<usize>> {
        if buffer.is_empty() {
            return Ok(Some(0));
        }
        match map_non_block(stream.read(buffer))? {
            Some(0) => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed")),
            other => Ok(other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::TestStepStream;
    use super::*;

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; 8];
        BigEndian::write_u64(&mut bytes, body.len() as u64);
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn whole_frames_decode_in_one_run() {
        let mut stream = TestStepStream::with_input(frame(b"ABC"));
        let mut op = RecvOperation::new(None);

        let msg = op.run(&mut stream).unwrap().unwrap();
        assert_eq!(b"ABC", msg.get_body());
    }

    #[test]
    fn zero_length_frames_decode() {
        let mut stream = TestStepStream::with_input(frame(b""));
        let mut op = RecvOperation::new(None);

        let msg = op.run(&mut stream).unwrap().unwrap();
        assert_eq!(0, msg.len());
    }

    #[test]
    fn split_frames_resume_across_runs() {
        let bytes = frame(b"ABCD");
        let mut op = RecvOperation::new(None);

        let mut first = TestStepStream::with_input(bytes[..5].to_vec());
        assert!(op.run(&mut first).unwrap().is_none());

        let mut second = TestStepStream::with_input(bytes[5..].to_vec());
        let msg = op.run(&mut second).unwrap().unwrap();
        assert_eq!(b"ABCD", msg.get_body());
    }

    #[test]
    fn oversize_frames_fail_before_the_payload() {
        let mut stream = TestStepStream::with_input(frame(&[0u8; 64]));
        let mut op = RecvOperation::new(Some(16));

        let err = op.run(&mut stream).unwrap_err();
        assert_eq!(io::ErrorKind::InvalidData, err.kind());
    }
}
