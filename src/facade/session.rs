// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use log::debug;

use crate::core::socket::Reply;
use crate::global::{Domain, SocketId, SocketType};
use crate::io_error::{other_io_error, terminated_io_error};
use crate::reactor::{dispatcher, Request, SessionRequest, WorkerSender};
use crate::transport::inproc;

use super::socket::Socket;

/// Capacity of the process-wide socket table.
pub const MAX_SOCKETS: usize = 512;

/// The library instance: a pool of worker threads, the socket table and the
/// in-process name registry. Sockets are pinned round-robin to a worker at
/// creation. Dropping the session terminates the library: every blocked
/// call is woken with the terminated error and the workers are joined.
pub struct Session {
    senders: Vec<WorkerSender>,
    threads: Vec<thread::JoinHandle<()>>,
    table: Arc<Mutex<SocketTable>>
}

impl Session {
    /// Creates a session with one worker per available CPU.
    pub fn new() -> io::Result<Session> {
        let workers = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);

        Session::with_workers(workers)
    }

    pub fn with_workers(count: usize) -> io::Result<Session> {
        let count = std::cmp::max(count, 1);
        let registry = inproc::new_registry();

        let mut senders = Vec::with_capacity(count);
        let mut inboxes = Vec::with_capacity(count);

        for _ in 0..count {
            let (tx, rx) = mpsc::channel();
            let (registration, set_readiness) = mio::Registration::new2();

            senders.push(WorkerSender::new(tx, set_readiness));
            inboxes.push((rx, registration));
        }

        let mut threads = Vec::with_capacity(count);

        for (index, (rx, registration)) in inboxes.into_iter().enumerate() {
            let senders = senders.clone();
            let registry = registry.clone();
            let thread = thread::Builder::new()
                .name(format!("spool-worker-{}", index))
                .spawn(move || dispatcher::run_worker(index, rx, registration, senders, registry))?;

            threads.push(thread);
        }

        debug!("session started with {} workers", count);

        Ok(Session {
            senders,
            threads,
            table: Arc::new(Mutex::new(SocketTable::new()))
        })
    }

    /// Creates a socket implementing the full semantics of its protocol.
    pub fn create_socket(&self, socket_type: SocketType) -> io::Result<Socket> {
        self.create(socket_type, Domain::Sp)
    }

    /// Creates a raw socket: wire headers stay exposed and no end-to-end
    /// state is kept, as intermediary devices need.
    pub fn create_raw_socket(&self, socket_type: SocketType) -> io::Result<Socket> {
        self.create(socket_type, Domain::SpRaw)
    }

    fn create(&self, socket_type: SocketType, domain: Domain) -> io::Result<Socket> {
        let (sid, worker) = self.table.lock().unwrap().reserve(self.senders.len())?;
        let (reply_tx, reply_rx) = mpsc::channel();
        let sender = self.senders[worker].clone();

        let created = sender
            .send(Request::Session(SessionRequest::CreateSocket(sid, socket_type, domain, reply_tx)))
            .and_then(|_| match reply_rx.recv() {
                Ok(Reply::SocketCreated) => Ok(()),
                Ok(Reply::SocketNotCreated(e)) => Err(e),
                Ok(_) => Err(other_io_error("unexpected reply")),
                Err(_) => Err(terminated_io_error())
            });

        match created {
            Ok(()) => Ok(Socket::new(sid, socket_type, domain, sender, reply_rx, self.table.clone())),
            Err(e) => {
                self.table.lock().unwrap().release(sid);
                Err(e)
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for sender in self.senders.iter() {
            let _ = sender.send(Request::Session(SessionRequest::Shutdown));
        }
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

enum Slot {
    Free { next: Option<usize> },
    Used
}

/// Fixed-capacity socket table with the free slots threaded as a list,
/// so reserving and releasing an id is O(1).
pub(crate) struct SocketTable {
    slots: Vec<Slot>,
    free_head: Option<usize>,
    next_worker: usize
}

impl SocketTable {
    fn new() -> SocketTable {
        let slots = (0..MAX_SOCKETS)
            .map(|index| Slot::Free {
                next: if index + 1 < MAX_SOCKETS { Some(index + 1) } else { None }
            })
            .collect();

        SocketTable {
            slots,
            free_head: Some(0),
            next_worker: 0
        }
    }

    fn reserve(&mut self, workers: usize) -> io::Result<(SocketId, usize)> {
        let index = self.free_head
            .ok_or_else(|| other_io_error("socket table full"))?;

        self.free_head = match self.slots[index] {
            Slot::Free { next } => next,
            Slot::Used => unreachable!("the free list runs through free slots")
        };
        self.slots[index] = Slot::Used;

        let worker = self.next_worker % workers;
        self.next_worker = self.next_worker.wrapping_add(1);

        Ok((SocketId(index), worker))
    }

    pub(crate) fn release(&mut self, sid: SocketId) {
        let index = sid.0;

        if matches!(self.slots[index], Slot::Used) {
            self.slots[index] = Slot::Free { next: self.free_head };
            self.free_head = Some(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_ids_are_reused_after_release() {
        let mut table = SocketTable::new();

        let (first, _) = table.reserve(2).unwrap();
        let (second, _) = table.reserve(2).unwrap();

        assert_eq!(SocketId(0), first);
        assert_eq!(SocketId(1), second);

        table.release(first);
        let (third, _) = table.reserve(2).unwrap();
        assert_eq!(SocketId(0), third);
    }

    #[test]
    fn workers_are_assigned_round_robin() {
        let mut table = SocketTable::new();

        let (_, w1) = table.reserve(2).unwrap();
        let (_, w2) = table.reserve(2).unwrap();
        let (_, w3) = table.reserve(2).unwrap();

        assert_eq!(0, w1);
        assert_eq!(1, w2);
        assert_eq!(0, w3);
    }

    #[test]
    fn a_full_table_refuses_new_sockets() {
        let mut table = SocketTable::new();

        for _ in 0..MAX_SOCKETS {
            table.reserve(1).unwrap();
        }
        table.reserve(1).unwrap_err();
    }
}
