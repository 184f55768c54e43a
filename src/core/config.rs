// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::global::{Domain, SocketType};
use crate::io_error::invalid_input_io_error;
use crate::transport::Destination;

/// Options settable on a socket. Generic options live in the socket's option
/// store; `Subscribe`/`Unsubscribe`/`ResendInterval`/`SurveyDeadline` are
/// delegated to the protocol; transport options become the defaults captured
/// by endpoints created afterwards.
pub enum SocketOption {
    /// Time to wait on close for pending outbound data; `None` waits forever.
    Linger(Option<Duration>),
    /// Timeout of the blocking send; `None` blocks forever.
    SendTimeout(Option<Duration>),
    /// Timeout of the blocking receive; `None` blocks forever.
    RecvTimeout(Option<Duration>),
    /// Outbound byte budget of a connection.
    SendBuffer(usize),
    /// Inbound byte budget of a connection.
    RecvBuffer(usize),
    /// Initial reconnection interval.
    ReconnectInterval(Duration),
    /// Upper bound of the exponential reconnection interval;
    /// zero keeps the interval constant.
    ReconnectIntervalMax(Duration),
    /// Send priority, 1..=16, captured by pipes attached afterwards.
    SendPriority(u8),
    /// Receive priority, 1..=16, captured by pipes attached afterwards.
    RecvPriority(u8),
    /// Refuse IPv6 on endpoints created afterwards.
    Ipv4Only(bool),
    TcpNoDelay(bool),
    /// Maximum accepted incoming message size; `None` is unlimited.
    RecvMaxSize(Option<u64>),
    Subscribe(String),
    Unsubscribe(String),
    ResendInterval(Duration),
    SurveyDeadline(Duration)
}

impl SocketOption {
    pub fn name(&self) -> &'static str {
        match *self {
            SocketOption::Linger(_) => "Linger",
            SocketOption::SendTimeout(_) => "SendTimeout",
            SocketOption::RecvTimeout(_) => "RecvTimeout",
            SocketOption::SendBuffer(_) => "SendBuffer",
            SocketOption::RecvBuffer(_) => "RecvBuffer",
            SocketOption::ReconnectInterval(_) => "ReconnectInterval",
            SocketOption::ReconnectIntervalMax(_) => "ReconnectIntervalMax",
            SocketOption::SendPriority(_) => "SendPriority",
            SocketOption::RecvPriority(_) => "RecvPriority",
            SocketOption::Ipv4Only(_) => "Ipv4Only",
            SocketOption::TcpNoDelay(_) => "TcpNoDelay",
            SocketOption::RecvMaxSize(_) => "RecvMaxSize",
            SocketOption::Subscribe(_) => "Subscribe",
            SocketOption::Unsubscribe(_) => "Unsubscribe",
            SocketOption::ResendInterval(_) => "ResendInterval",
            SocketOption::SurveyDeadline(_) => "SurveyDeadline"
        }
    }
}

/// Readable socket properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Linger,
    SendTimeout,
    RecvTimeout,
    SendBuffer,
    RecvBuffer,
    ReconnectInterval,
    ReconnectIntervalMax,
    SendPriority,
    RecvPriority,
    Ipv4Only,
    TcpNoDelay,
    RecvMaxSize,
    Domain,
    Protocol,
    SendFd,
    RecvFd
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionValue {
    Duration(Option<Duration>),
    Size(usize),
    MaxSize(Option<u64>),
    Bool(bool),
    Priority(u8),
    Domain(Domain),
    Protocol(SocketType),
    Fd(RawFd)
}

/// Per-socket option store with the library defaults.
pub struct Config {
    pub linger: Option<Duration>,
    pub send_timeout: Option<Duration>,
    pub recv_timeout: Option<Duration>,
    pub send_buffer: usize,
    pub recv_buffer: usize,
    pub reconnect_ivl: Duration,
    pub reconnect_ivl_max: Duration,
    pub send_priority: u8,
    pub recv_priority: u8,
    pub ipv4only: bool,
    pub tcp_nodelay: bool,
    pub recv_max_size: Option<u64>
}

impl Default for Config {
    fn default() -> Config {
        Config {
            linger: Some(Duration::from_millis(1000)),
            send_timeout: None,
            recv_timeout: None,
            send_buffer: 128 * 1024,
            recv_buffer: 128 * 1024,
            reconnect_ivl: Duration::from_millis(100),
            reconnect_ivl_max: Duration::from_millis(0),
            send_priority: 8,
            recv_priority: 8,
            ipv4only: true,
            tcp_nodelay: false,
            recv_max_size: Some(1024 * 1024)
        }
    }
}

impl Config {
    /// Applies a generic option; Ok(false) means the option belongs
    /// to the protocol instead.
    pub fn set(&mut self, option: &SocketOption) -> io::Result<bool> {
        match *option {
            SocketOption::Linger(v) => self.linger = v,
            SocketOption::SendTimeout(v) => self.send_timeout = v,
            SocketOption::RecvTimeout(v) => self.recv_timeout = v,
            SocketOption::SendBuffer(v) => {
                if v == 0 {
                    return Err(invalid_input_io_error("send buffer cannot be empty"));
                }
                self.send_buffer = v;
            }
            SocketOption::RecvBuffer(v) => {
                if v == 0 {
                    return Err(invalid_input_io_error("receive buffer cannot be empty"));
                }
                self.recv_buffer = v;
            }
            SocketOption::ReconnectInterval(v) => {
                if v.is_zero() {
                    return Err(invalid_input_io_error("reconnect interval cannot be zero"));
                }
                self.reconnect_ivl = v;
            }
            SocketOption::ReconnectIntervalMax(v) => self.reconnect_ivl_max = v,
            SocketOption::SendPriority(v) => self.send_priority = checked_priority(v)?,
            SocketOption::RecvPriority(v) => self.recv_priority = checked_priority(v)?,
            SocketOption::Ipv4Only(v) => self.ipv4only = v,
            SocketOption::TcpNoDelay(v) => self.tcp_nodelay = v,
            SocketOption::RecvMaxSize(v) => self.recv_max_size = v,
            SocketOption::Subscribe(_) |
            SocketOption::Unsubscribe(_) |
            SocketOption::ResendInterval(_) |
            SocketOption::SurveyDeadline(_) => return Ok(false)
        }

        Ok(true)
    }

    /// Reads a generic option; `None` means the property belongs
    /// to the socket itself.
    pub fn get(&self, kind: OptionKind) -> Option<OptionValue> {
        match kind {
            OptionKind::Linger => Some(OptionValue::Duration(self.linger)),
            OptionKind::SendTimeout => Some(OptionValue::Duration(self.send_timeout)),
            OptionKind::RecvTimeout => Some(OptionValue::Duration(self.recv_timeout)),
            OptionKind::SendBuffer => Some(OptionValue::Size(self.send_buffer)),
            OptionKind::RecvBuffer => Some(OptionValue::Size(self.recv_buffer)),
            OptionKind::ReconnectInterval => Some(OptionValue::Duration(Some(self.reconnect_ivl))),
            OptionKind::ReconnectIntervalMax => Some(OptionValue::Duration(Some(self.reconnect_ivl_max))),
            OptionKind::SendPriority => Some(OptionValue::Priority(self.send_priority)),
            OptionKind::RecvPriority => Some(OptionValue::Priority(self.recv_priority)),
            OptionKind::Ipv4Only => Some(OptionValue::Bool(self.ipv4only)),
            OptionKind::TcpNoDelay => Some(OptionValue::Bool(self.tcp_nodelay)),
            OptionKind::RecvMaxSize => Some(OptionValue::MaxSize(self.recv_max_size)),
            OptionKind::Domain |
            OptionKind::Protocol |
            OptionKind::SendFd |
            OptionKind::RecvFd => None
        }
    }

    /// Captures the connection parameters of a new endpoint.
    pub fn destination(&self, addr: &str, pids: (u16, u16)) -> Destination {
        Destination {
            addr: addr.to_owned(),
            pids,
            recv_max_size: self.recv_max_size,
            send_buffer: self.send_buffer,
            recv_buffer: self.recv_buffer,
            tcp_nodelay: self.tcp_nodelay,
            ipv4only: self.ipv4only
        }
    }
}

fn checked_priority(value: u8) -> io::Result<u8> {
    if (1..=16).contains(&value) {
        Ok(value)
    } else {
        Err(invalid_input_io_error("priority must be in range 1..=16"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_outside_the_range_are_rejected() {
        let mut config = Config::default();

        config.set(&SocketOption::SendPriority(0)).unwrap_err();
        config.set(&SocketOption::SendPriority(17)).unwrap_err();
        assert!(config.set(&SocketOption::SendPriority(1)).unwrap());
        assert_eq!(1, config.send_priority);
    }

    #[test]
    fn protocol_options_are_not_consumed() {
        let mut config = Config::default();

        assert!(!config.set(&SocketOption::Subscribe("A".to_owned())).unwrap());
        assert!(!config.set(&SocketOption::ResendInterval(Duration::from_millis(1))).unwrap());
    }
}
