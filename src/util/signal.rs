// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use log::warn;

/// A readiness flag observable from outside the library as a file descriptor.
///
/// The worker raises the flag by writing one byte to the pair and lowers it
/// by draining the pair, so the exposed descriptor polls as readable exactly
/// while the flag is raised. External event loops can thus wait on a socket's
/// send or receive readiness with plain `poll`/`select`.
pub struct SignalFd {
    reader: UnixStream,
    writer: UnixStream,
    raised: bool
}

impl SignalFd {
    pub fn new() -> io::Result<SignalFd> {
        let (reader, writer) = UnixStream::pair()?;

        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;

        Ok(SignalFd {
            reader,
            writer,
            raised: false
        })
    }

    /// The descriptor external pollers wait on. Read-only for the caller:
    /// consuming its bytes would corrupt the readiness flag.
    pub fn as_raw_fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }

    pub fn update(&mut self, ready: bool) {
        if ready {
            self.raise();
        } else {
            self.lower();
        }
    }

    fn raise(&mut self) {
        if self.raised {
            return;
        }
        match self.writer.write(&[1u8]) {
            Ok(_) => self.raised = true,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => self.raised = true,
            Err(e) => warn!("failed to raise readiness signal: '{:?}'", e)
        }
    }

    fn lower(&mut self) {
        if !self.raised {
            return;
        }
        let mut drain = [0u8; 8];
        loop {
            match self.reader.read(&mut drain) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("failed to lower readiness signal: '{:?}'", e);
                    break;
                }
            }
        }
        self.raised = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn descriptor_is_readable_exactly_while_raised() {
        let mut signal = SignalFd::new().unwrap();
        let mut probe = signal.reader.try_clone().unwrap();
        let mut byte = [0u8; 1];

        assert_eq!(io::ErrorKind::WouldBlock, probe.read(&mut byte).unwrap_err().kind());

        signal.update(true);
        signal.update(true);
        assert_eq!(1, probe.read(&mut byte).unwrap());

        // the probe consumed the byte on behalf of the worker
        signal.raised = true;
        signal.update(false);
        assert_eq!(io::ErrorKind::WouldBlock, probe.read(&mut byte).unwrap_err().kind());
    }
}
