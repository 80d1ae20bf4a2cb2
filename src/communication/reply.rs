//! Reply
//!
//! The write-back path of the interpreter: replies are accumulated here
//! until the bulk-IN path drains them to the host.
//!

use std::cell::RefCell;
use std::rc::Rc;

use crate::constants::misc;
use crate::error::Error;
use crate::types::{ControlSignal, ReplyBuffer, StatusBits, StatusRegister};

use anyhow::Result;

/// Reply cycle state shared between the interpreter and the bulk-IN path.
#[derive(Debug, Default)]
pub(crate) struct ReplyState {
    pub(crate) buffer: ReplyBuffer,
    /// An append overflowed; the rest of this reply cycle is refused
    pub(crate) overflowed: bool,
    /// The bulk-IN path started draining `buffer`
    pub(crate) in_flight: bool,
    /// The interpreter raised SRQ; the transport is notified on the next task tick
    pub(crate) srq_requested: bool,
    /// No command is waiting for a reply; writes are refused until the next one
    pub(crate) closed: bool,
}

impl ReplyState {
    /// Drop the reply and whatever the cycle recorded about it.
    pub(crate) fn reset(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
        self.in_flight = false;
    }
}

/// ### Writeback
///
/// Handle given to the interpreter so it can deliver replies and drive the
/// control lines, during [`Interpreter::invoke`](crate::Interpreter::invoke)
/// or later.
///
/// A reply may be written in several parts. All parts of one reply must be
/// written within one task tick of the command being invoked.
///
#[derive(Debug, Clone)]
pub struct Writeback {
    pub(crate) status: StatusRegister,
    pub(crate) reply: Rc<RefCell<ReplyState>>,
}

impl Writeback {
    pub(crate) fn new(status: StatusRegister) -> Writeback {
        Writeback {
            status,
            reply: Rc::new(RefCell::new(ReplyState::default())),
        }
    }

    /// ### Write
    ///
    /// Append `data` to the reply. The first write of a reply sets MAV.
    ///
    /// An overflow discards the whole reply and refuses further writes until
    /// the next command cycle. Nothing is ever truncated.
    ///
    /// Once the cycle that invoked the interpreter is over, late writes are
    /// refused with `Err(ReplyClosed)` so MAV never announces a reply the
    /// host cannot read.
    ///
    /// #### Arguments
    /// - `data` -> the bytes to append
    ///
    /// #### Returns
    /// The number of bytes accepted
    ///
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let mut reply = self.reply.borrow_mut();

        if reply.in_flight {
            log::warn!("reply write of {} bytes while transmitting", data.len());
            return Err(Error::ReplyBusy.into());
        }
        if reply.closed {
            log::warn!("reply write of {} bytes outside a command cycle", data.len());
            return Err(Error::ReplyClosed.into());
        }
        if reply.overflowed {
            return Err(Error::ReplyOverflow {
                capacity: misc::REPLY_BUFFER_SIZE,
            }
            .into());
        }
        if data.is_empty() {
            return Ok(0);
        }

        let first_write = reply.buffer.is_empty();
        if reply.buffer.extend_from_slice(data).is_err() {
            log::warn!(
                "reply overflow: {} + {} bytes, dropping reply",
                reply.buffer.len(),
                data.len()
            );
            reply.buffer.clear();
            reply.overflowed = true;
            self.status.clear_bits(StatusBits::MAV);
            return Err(Error::ReplyOverflow {
                capacity: misc::REPLY_BUFFER_SIZE,
            }
            .into());
        }

        if first_write {
            self.status.set_bits(StatusBits::MAV);
        }
        log::trace!("reply += {} bytes ({} total)", data.len(), reply.buffer.len());

        Ok(data.len())
    }

    /// ### Control
    ///
    /// Drive a control line. Only [`ControlSignal::ServiceRequest`] has an
    /// effect: SRQ is set in the status byte and the transport is asked to
    /// send a service request on the next task tick.
    ///
    pub fn control(&self, signal: ControlSignal) {
        match signal {
            ControlSignal::ServiceRequest => {
                self.status.set_bits(StatusBits::SRQ);
                self.reply.borrow_mut().srq_requested = true;
            }
            other => log::debug!("ignoring control signal {:?}", other),
        }
    }

    /// The status register the reply path reports into
    pub fn status(&self) -> &StatusRegister {
        &self.status
    }

    /// Length of the reply accumulated so far
    pub fn len(&self) -> usize {
        self.reply.borrow().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
