//! ## Types
//!
//! The different types used across the crate
//!

use std::cell::Cell;
use std::rc::Rc;

use bitflags::bitflags;

use crate::constants::misc;

bitflags! {
    /// ### Status Bits
    ///
    /// Named bits of the IEEE 488.2 status byte bridged by this crate.
    ///
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusBits: u8 {
        /// Questionable status summary. Read by the host, never changed here.
        const QUESTIONABLE = 0x08;
        /// Message available: a reply is waiting in the reply buffer
        const MAV          = 0x10;
        /// Standard event status summary
        const ESB          = 0x20;
        /// Request service
        const SRQ          = 0x40;
    }
}

/// ### Status Register
///
/// Accessor for the single status byte shared between the interpreter side
/// and the transport side.
///
/// Clones share the same byte. Everything runs on one thread of control, so
/// a plain `Cell` is enough; a multi-core port swaps the storage here
/// without touching call sites.
///
#[derive(Debug, Clone, Default)]
pub struct StatusRegister(Rc<Cell<u8>>);

impl StatusRegister {
    /// ### New
    ///
    /// Return a fresh status register set to 0.
    ///
    pub fn new() -> StatusRegister {
        StatusRegister::default()
    }

    pub fn get(&self) -> u8 {
        self.0.get()
    }

    pub fn set(&self, value: u8) {
        self.0.set(value)
    }

    /// The status byte with its known bits named
    pub fn bits(&self) -> StatusBits {
        StatusBits::from_bits_retain(self.get())
    }

    pub fn set_bits(&self, mask: StatusBits) {
        self.set(self.get() | mask.bits())
    }

    pub fn clear_bits(&self, mask: StatusBits) {
        self.set(self.get() & !mask.bits())
    }

    /// ### Read And Clear SRQ
    ///
    /// Return the status byte as it was and clear the SRQ bit, as the
    /// READ_STATUS_BYTE request requires.
    ///
    pub fn read_and_clear_srq(&self) -> u8 {
        let old = self.get();
        self.set(old & !StatusBits::SRQ.bits());
        old
    }
}

/// Buffer holding a bulk-OUT command while it is reassembled
pub type CommandBuffer = heapless::Vec<u8, { misc::COMMAND_BUFFER_SIZE }>;

/// Buffer the interpreter appends its reply into
pub type ReplyBuffer = heapless::Vec<u8, { misc::REPLY_BUFFER_SIZE }>;

/// ### Transfer State
///
/// Where the command/reply cycle currently stands.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    /// No reply or echo is owed to the host
    #[default]
    Idle,
    /// A command was just handed to the interpreter. It gets one task tick to reply.
    CommandReceived,
    /// Deciding what to send back, or draining it to the host
    ReadyToReply,
}

/// Which buffer the bulk-IN path is currently draining
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Reply,
    /// Legacy path: the received command is echoed back when no reply exists
    Command,
}

/// ### Bulk In Chunk
///
/// One DEV_DEP_MSG_IN transfer handed to the transport.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkInChunk<'a> {
    /// The 12 byte DEV_DEP_MSG_IN header to put in front of `data`
    pub header: [u8; misc::USBTMC_HEADER_SIZE],
    /// The payload of this transfer
    pub data: &'a [u8],
    /// Set on the last chunk of the message
    pub end_of_message: bool,
}

/// ### Bulk In Status
///
/// What happened to a bulk-IN request.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkInStatus {
    /// A chunk was handed to the transport
    Transmitted { len: usize, end_of_message: bool },
    /// Nothing to send yet. The transport must NAK, not stall.
    Withheld,
}

/// ### Control Signal
///
/// Control lines the interpreter can drive.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Raise a service request
    ServiceRequest,
    GoToLocal,
    LocalLockout,
}
