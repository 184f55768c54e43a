// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io::{Error, ErrorKind};

pub fn other_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::Other, msg)
}

pub fn invalid_data_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::InvalidData, msg)
}

pub fn would_block_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::WouldBlock, msg)
}

pub fn invalid_input_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::InvalidInput, msg)
}

pub fn timed_out_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::TimedOut, msg)
}

/// The error reported to any caller blocked on, or later using,
/// a socket whose session has shut down.
pub fn terminated_io_error() -> Error {
    other_io_error("session terminated")
}

pub fn broken_pipe_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::BrokenPipe, msg)
}
