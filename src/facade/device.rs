// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;
use std::thread;
use std::time::Duration;

use crate::io_error::invalid_input_io_error;

use super::socket::Socket;

const IDLE_PAUSE: Duration = Duration::from_millis(1);

/// Pumps messages between two raw sockets of complementary types, headers
/// included, in both directions. Runs until the session shuts down or a
/// socket fails, and reports that error.
pub fn device(mut left: Socket, mut right: Socket) -> io::Result<()> {
    if !left.domain().is_raw() || !right.domain().is_raw() {
        return Err(invalid_input_io_error("devices require raw sockets"));
    }
    if !left.matches(&right) {
        return Err(invalid_input_io_error("device socket types are not compatible"));
    }

    loop {
        let mut idle = true;

        idle &= !forward(&mut left, &mut right)?;
        idle &= !forward(&mut right, &mut left)?;

        if idle {
            thread::sleep(IDLE_PAUSE);
        }
    }
}

/// Pumps a single raw socket back into itself: whatever arrives is sent
/// back out, minus the originating peer (a bus relay, for example).
pub fn loopback_device(mut socket: Socket) -> io::Result<()> {
    if !socket.domain().is_raw() {
        return Err(invalid_input_io_error("devices require raw sockets"));
    }

    loop {
        let msg = socket.recv_msg()?;
        socket.send_msg(msg)?;
    }
}

fn forward(from: &mut Socket, to: &mut Socket) -> io::Result<bool> {
    match from.try_recv_msg() {
        Ok(msg) => {
            to.send_msg(msg)?;
            Ok(true)
        }
        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e)
    }
}
