// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Transports: pluggable connection factories. A transport turns an address
//! into pipes (connections) and acceptors (listeners); everything above the
//! transport deals in whole messages and never sees descriptors.

pub mod acceptor;
pub mod addr;
pub mod inproc;
pub mod ipc;
pub mod pipe;
pub mod stream;
pub mod tcp;

use std::io;

use crate::io_error::invalid_input_io_error;

/// Maximum length of a whole address, scheme included.
pub const ADDR_MAX: usize = 128;

/// Per-endpoint connection parameters, captured from the socket options
/// when the endpoint is created.
#[derive(Debug, Clone)]
pub struct Destination {
    pub addr: String,
    pub pids: (u16, u16),
    pub recv_max_size: Option<u64>,
    pub send_buffer: usize,
    pub recv_buffer: usize,
    pub tcp_nodelay: bool,
    pub ipv4only: bool
}

pub trait Transport {
    fn connect(&self, dest: &Destination) -> io::Result<Box<dyn pipe::Pipe>>;
    fn bind(&self, dest: &Destination) -> io::Result<Box<dyn acceptor::Acceptor>>;
}

pub fn create_transport(scheme: &str) -> io::Result<Box<dyn Transport>> {
    match scheme {
        "tcp" => Ok(Box::new(tcp::Tcp)),
        "ipc" => Ok(Box::new(ipc::Ipc)),
        _ => Err(invalid_input_io_error("unknown transport scheme"))
    }
}

/// Splits `scheme://address` and validates the address length.
pub fn split_url(url: &str) -> io::Result<(&str, &str)> {
    let mut parts = url.splitn(2, "://");
    let scheme = parts.next().unwrap_or("");
    let addr = parts.next().ok_or_else(|| invalid_input_io_error("missing scheme in address"))?;

    if scheme.is_empty() || addr.is_empty() {
        return Err(invalid_input_io_error("malformed address"));
    }
    if addr.len() >= ADDR_MAX {
        return Err(invalid_input_io_error("address too long"));
    }

    Ok((scheme, addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_split_into_scheme_and_address() {
        assert_eq!(("tcp", "127.0.0.1:5454"), split_url("tcp://127.0.0.1:5454").unwrap());
        assert_eq!(("inproc", "a"), split_url("inproc://a").unwrap());

        split_url("127.0.0.1:5454").unwrap_err();
        split_url("tcp://").unwrap_err();
        split_url("://x").unwrap_err();
    }

    #[test]
    fn overlong_urls_are_rejected() {
        let url = format!("inproc://{}", "x".repeat(ADDR_MAX));

        assert!(split_url(&url).is_err());
    }

    #[test]
    fn unknown_schemes_are_rejected() {
        assert!(create_transport("smtp").is_err());
    }
}
