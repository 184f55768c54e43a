// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io::{self, IoSlice, Write};

use byteorder::{BigEndian, ByteOrder};

use crate::message::Message;

/// Resumable write of one framed message: the 64 bit length prefix followed
/// by the header and body, submitted as a single vectored write and resumed
/// across partial writes.
pub struct SendOperation {
    prefix: [u8; 8],
    msg: Message,
    written: usize
}

impl SendOperation {
    pub fn new(msg: Message) -> SendOperation {
        let mut prefix = [0u8; 8];

        BigEndian::write_u64(&mut prefix, msg.len() as u64);

        SendOperation {
            prefix,
            msg,
            written: 0
        }
    }

    fn total(&self) -> usize {
        self.prefix.len() + self.msg.len()
    }

    /// Makes as much progress as the stream allows.
    /// Ok(true) once the whole frame is out, Ok(false) on would-block.
    pub fn run<S : Write>(&mut self, stream: &mut S) -> io::Result<bool> {
        while self.written < self.total() {
            let slices: [IoSlice; 3] = [
                IoSlice::new(remainder(&self.prefix, self.written, 0)),
                IoSlice::new(remainder(self.msg.get_header(), self.written, self.prefix.len())),
                IoSlice::new(remainder(
                    self.msg.get_body(),
                    self.written,
                    self.prefix.len() + self.msg.get_header().len()))
            ];

            match stream.write_vectored(&slices) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "failed to write frame")),
                Ok(n) => self.written += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e)
            }
        }

        Ok(true)
    }
}

/// The unwritten tail of a segment starting at `offset` within the frame.
fn remainder<'a>(segment: &'a [u8], written: usize, offset: usize) -> &'a [u8] {
    if written <= offset {
        segment
    } else if written - offset >= segment.len() {
        &[]
    } else {
        &segment[written - offset..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dribble {
        out: Vec<u8>,
        chunk: usize
    }

    impl Write for Dribble {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = std::cmp::min(self.chunk, buf.len());
            self.out.extend_from_slice(&buf[..n]);
            Ok(n)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn frame_is_length_prefixed_header_then_body() {
        let msg = Message::with_header_and_body(vec![0x80, 0, 0, 1], vec![65, 66, 67]);
        let mut op = SendOperation::new(msg);
        let mut out = Vec::new();

        assert!(op.run(&mut out).unwrap());
        assert_eq!(
            vec![0, 0, 0, 0, 0, 0, 0, 7, 0x80, 0, 0, 1, 65, 66, 67],
            out);
    }

    #[test]
    fn partial_writes_resume_where_they_stopped() {
        let msg = Message::with_body(vec![1, 2, 3, 4, 5]);
        let mut op = SendOperation::new(msg);
        let mut out = Dribble { out: Vec::new(), chunk: 3 };

        assert!(op.run(&mut out).unwrap());
        assert_eq!(vec![0, 0, 0, 0, 0, 0, 0, 5, 1, 2, 3, 4, 5], out.out);
    }

    #[test]
    fn zero_length_bodies_still_frame() {
        let msg = Message::with_body(Vec::new());
        let mut op = SendOperation::new(msg);
        let mut out = Vec::new();

        assert!(op.run(&mut out).unwrap());
        assert_eq!(vec![0, 0, 0, 0, 0, 0, 0, 0], out);
    }
}
