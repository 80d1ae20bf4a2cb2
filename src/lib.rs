//! # USBTMC Bridge
//!
//! Device side of the USBTMC protocol, bridging bulk transfers to a
//! line-oriented instrument command interpreter (SCPI or similar).
//!
//! Command messages arrive in fragments on the bulk-OUT endpoint and are
//! reassembled before they are handed to the interpreter. The interpreter
//! writes its reply back through a [`Writeback`] handle, and the reply is
//! served on the bulk-IN endpoint in chunks sized to what the host asked for.
//! The IEEE 488.2 status byte (MAV, SRQ) is kept in step with all of it.
//!
//! The USB stack and the interpreter stay outside this crate; they plug in
//! through the [`Transport`] and [`Interpreter`] traits.
//!
//! ## Example
//!
//! ```rust
//! use usbtmc_bridge::{BulkInChunk, Interpreter, Transport, UsbtmcDevice, Writeback};
//!
//! struct Idn;
//!
//! impl Interpreter for Idn {
//!     fn invoke(&mut self, command: &[u8], writeback: &Writeback) {
//!         if command.eq_ignore_ascii_case(b"*IDN?\n") {
//!             let _ = writeback.write(b"ACME,1,0,1\n");
//!         }
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Endpoints {
//!     sent: Vec<u8>,
//! }
//!
//! impl Transport for Endpoints {
//!     fn start_bus_read(&mut self) {}
//!     fn transmit(&mut self, chunk: BulkInChunk<'_>) {
//!         self.sent.extend_from_slice(chunk.data);
//!     }
//!     fn send_srq(&mut self) {}
//! }
//!
//! let mut device = UsbtmcDevice::new(Idn, Endpoints::default());
//! device.on_bulk_out_start(6).unwrap();
//! device.on_fragment_arrived(b"*IDN?\n", true).unwrap();
//! device.task();
//! device.on_bulk_in_requested(64);
//! device.on_bulk_in_complete();
//!
//! assert_eq!(device.transport().sent, b"ACME,1,0,1\n");
//! ```
//!
//! ## Scheduling
//!
//! Everything runs on one thread of control. [`UsbtmcDevice::task`] must be
//! called regularly from the main loop: a completed command gets exactly one
//! tick for the interpreter to start its reply. A command with no reply by
//! then is treated as one that does not produce any.
//!

mod constants;
mod error;
mod init;
mod types;
mod communication {
    pub mod bulk;
    pub mod control;
    pub mod header;
    pub mod reply;
}

pub use communication::control::capabilities_response;
pub use communication::header::{device_dependent_msg_in_header, BulkOutHeader};
pub use communication::reply::Writeback;
pub use constants::misc::{COMMAND_BUFFER_SIZE, REPLY_BUFFER_SIZE, USBTMC_HEADER_SIZE};
pub use constants::usb::{USBTMC_CLASS_CODE, USBTMC_PROTOCOL_CODE, USBTMC_SUBCLASS_CODE};
pub use error::{CommandError, Error};
pub use init::{Capabilities, Config};
pub use types::{
    BulkInChunk, BulkInStatus, ControlSignal, StatusBits, StatusRegister, TransferState,
};

use communication::bulk::BulkInProgress;
use communication::control::AbortCounts;
use types::CommandBuffer;

use anyhow::Result;

/// ### Interpreter
///
/// The instrument command interpreter fed by the bridge.
///
pub trait Interpreter {
    /// Execute one complete command message.
    ///
    /// The reply, if any, goes through `writeback`, either before returning
    /// or within one task tick. Keep a clone of `writeback` to reply later.
    fn invoke(&mut self, command: &[u8], writeback: &Writeback);

    /// Handle a USB488 TRIGGER message.
    fn trigger(&mut self) -> Result<(), CommandError> {
        Err(CommandError::UndefinedHeader)
    }

    /// Queue a command-level error raised outside of `invoke`, for the host
    /// to read back through the interpreter's error queue (`SYSTem:ERRor?`).
    fn push_error(&mut self, error: CommandError) {
        log::warn!("command error dropped, no error queue: {}", error);
    }

    /// Blink whatever identifies the instrument to the user.
    fn indicator_pulse(&mut self) {}
}

/// ### Transport
///
/// The few USB endpoint operations the bridge needs.
///
pub trait Transport {
    /// Arm the bulk-OUT endpoint for the next transfer
    fn start_bus_read(&mut self);
    /// Send one DEV_DEP_MSG_IN transfer on the bulk-IN endpoint
    fn transmit(&mut self, chunk: BulkInChunk<'_>);
    /// Notify the host of a service request on the interrupt endpoint
    fn send_srq(&mut self);
}

/// Allow an interpreter by mutable reference
impl<T: Interpreter + ?Sized> Interpreter for &mut T {
    fn invoke(&mut self, command: &[u8], writeback: &Writeback) {
        (**self).invoke(command, writeback)
    }

    fn trigger(&mut self) -> Result<(), CommandError> {
        (**self).trigger()
    }

    fn push_error(&mut self, error: CommandError) {
        (**self).push_error(error)
    }

    fn indicator_pulse(&mut self) {
        (**self).indicator_pulse()
    }
}

/// Allow a boxed interpreter
impl<T: Interpreter + ?Sized> Interpreter for Box<T> {
    fn invoke(&mut self, command: &[u8], writeback: &Writeback) {
        (**self).invoke(command, writeback)
    }

    fn trigger(&mut self) -> Result<(), CommandError> {
        (**self).trigger()
    }

    fn push_error(&mut self, error: CommandError) {
        (**self).push_error(error)
    }

    fn indicator_pulse(&mut self) {
        (**self).indicator_pulse()
    }
}

/// Allow a transport by mutable reference
impl<T: Transport + ?Sized> Transport for &mut T {
    fn start_bus_read(&mut self) {
        (**self).start_bus_read()
    }

    fn transmit(&mut self, chunk: BulkInChunk<'_>) {
        (**self).transmit(chunk)
    }

    fn send_srq(&mut self) {
        (**self).send_srq()
    }
}

/// Allow a boxed transport
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn start_bus_read(&mut self) {
        (**self).start_bus_read()
    }

    fn transmit(&mut self, chunk: BulkInChunk<'_>) {
        (**self).transmit(chunk)
    }

    fn send_srq(&mut self) {
        (**self).send_srq()
    }
}

/// ### UsbtmcDevice
///
/// A USBTMC interface bridging its bulk endpoints to an interpreter.
///
/// The transport calls the `on_*` methods from its endpoint callbacks, and
/// the main loop calls [`task`](UsbtmcDevice::task).
///
#[derive(Debug)]
pub struct UsbtmcDevice<I, T> {
    interpreter: I,
    transport: T,
    config: Config,
    status: StatusRegister,
    writeback: Writeback,
    command: CommandBuffer,
    /// The final fragment of `command` arrived; the next fragment starts a new one
    command_complete: bool,
    /// The current transfer overflowed; its remaining fragments are dropped
    discarding: bool,
    state: TransferState,
    bulk_in: BulkInProgress,
    aborted: AbortCounts,
}

impl<I: Interpreter, T: Transport> UsbtmcDevice<I, T> {
    /// ### New
    ///
    /// Create a device with the default configuration.
    ///
    pub fn new(interpreter: I, transport: T) -> UsbtmcDevice<I, T> {
        UsbtmcDevice::with_config(interpreter, transport, Config::default())
    }

    /// ### With Config
    ///
    /// Create a device.
    ///
    /// #### Arguments
    /// - `interpreter` -> the command interpreter fed with complete commands
    /// - `transport` -> the endpoint operations of the USB stack
    /// - `config` -> capabilities and behaviour settings
    ///
    pub fn with_config(interpreter: I, transport: T, config: Config) -> UsbtmcDevice<I, T> {
        let status = StatusRegister::new();
        let writeback = Writeback::new(status.clone());
        // nothing to reply to before the first command
        writeback.reply.borrow_mut().closed = true;

        UsbtmcDevice {
            interpreter,
            transport,
            config,
            status,
            writeback,
            command: CommandBuffer::new(),
            command_complete: false,
            discarding: false,
            state: TransferState::Idle,
            bulk_in: BulkInProgress::default(),
            aborted: AbortCounts::default(),
        }
    }

    /// ### On Open
    ///
    /// The interface was configured by the host: start listening on bulk-OUT.
    ///
    pub fn on_open(&mut self) {
        log::debug!("usbtmc interface opened");
        self.transport.start_bus_read();
    }

    /// ### On Bulk Out Header
    ///
    /// Decode a bulk-OUT header and act on it: begin a command transfer,
    /// register a bulk-IN request or trigger the instrument.
    ///
    /// Payload bytes following a DEV_DEP_MSG_OUT header still have to be
    /// passed to [`on_fragment_arrived`](UsbtmcDevice::on_fragment_arrived).
    ///
    /// #### Arguments
    /// - `bytes` -> the transfer, starting with its 12 byte header
    ///
    pub fn on_bulk_out_header(&mut self, bytes: &[u8]) -> Result<BulkOutHeader> {
        let header = BulkOutHeader::parse(bytes)?;
        log::trace!("bulk out header {:?}", header);

        match header {
            BulkOutHeader::DevDepMsgOut { transfer_size, .. } => {
                self.on_bulk_out_start(transfer_size as usize)?;
            }
            BulkOutHeader::RequestDevDepMsgIn {
                btag,
                transfer_size,
                ..
            } => {
                self.request_bulk_in(transfer_size as usize, btag);
            }
            BulkOutHeader::Trigger { .. } => self.on_trigger(),
        }

        Ok(header)
    }

    /// ### On Trigger
    ///
    /// A USB488 TRIGGER message arrived. SRQ is raised whether or not the
    /// interpreter implements triggering; if it does not, the error goes to
    /// the interpreter's error queue.
    ///
    pub fn on_trigger(&mut self) {
        if let Err(e) = self.interpreter.trigger() {
            log::warn!("trigger not handled: {}", e);
            self.interpreter.push_error(e);
        }
        self.status.set_bits(StatusBits::SRQ);
    }

    /// The current step of the command/reply cycle
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// The shared status byte
    pub fn status(&self) -> &StatusRegister {
        &self.status
    }

    /// A handle for the interpreter to reply through
    pub fn writeback(&self) -> Writeback {
        self.writeback.clone()
    }

    /// Bytes of the command currently held in the reassembly buffer
    pub fn command(&self) -> &[u8] {
        &self.command
    }

    /// Length of the reply waiting to be sent
    pub fn reply_len(&self) -> usize {
        self.writeback.len()
    }

    /// Bytes of the current message already sent on bulk-IN
    pub fn transmitted(&self) -> usize {
        self.bulk_in.tx_cursor
    }

    /// Whether a bulk-IN request from the host is outstanding
    pub fn bulk_in_pending(&self) -> bool {
        self.bulk_in.request.is_some()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn interpreter(&self) -> &I {
        &self.interpreter
    }

    pub fn interpreter_mut(&mut self) -> &mut I {
        &mut self.interpreter
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
