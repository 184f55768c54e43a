// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use crate::message::Message;
use crate::transport::pipe::Context;

use super::{PipeState, StepStream};

/// Terminal state: the connection is gone, everything is ignored.
pub struct Dead;

impl<T : StepStream> PipeState<T> for Dead {
    fn name(&self) -> &'static str {
        "Dead"
    }

    fn open(self: Box<Self>, _: &mut dyn Context) -> Box<dyn PipeState<T>> {
        self
    }

    fn close(self: Box<Self>, _: &mut dyn Context) -> Box<dyn PipeState<T>> {
        self
    }

    fn send(self: Box<Self>, _: &mut dyn Context, _: Message) -> Box<dyn PipeState<T>> {
        self
    }

    fn recv(self: Box<Self>, _: &mut dyn Context) -> Box<dyn PipeState<T>> {
        self
    }

    fn ready(self: Box<Self>, _: &mut dyn Context, _: mio::Ready) -> Box<dyn PipeState<T>> {
        self
    }

    fn on_timeout(self: Box<Self>, _: &mut dyn Context) -> Box<dyn PipeState<T>> {
        self
    }
}
