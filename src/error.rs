//! ## USBTMC Errors
//!
//! The errors used throughout the crate.
//!

/// Protocol and buffer faults raised while bridging transfers.
///
/// None of these are fatal: the affected command cycle is reset before the
/// error is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("bulk out transfer of {requested} bytes exceeds the command buffer ({capacity} bytes)")]
    TransferTooLarge { requested: usize, capacity: usize },
    #[error("command buffer overflow ({capacity} bytes)")]
    CommandOverflow { capacity: usize },
    #[error("reply buffer overflow ({capacity} bytes)")]
    ReplyOverflow { capacity: usize },
    #[error("reply is already being transmitted")]
    ReplyBusy,
    #[error("no command is awaiting a reply")]
    ReplyClosed,
    #[error("bulk header is {0} bytes long, expected 12")]
    HeaderTooShort(usize),
    #[error("bTag {btag:#04x} does not match its inverse {inverse:#04x}")]
    InvalidBTag { btag: u8, inverse: u8 },
    #[error("unsupported bulk message id {0}")]
    UnknownMsgId(u8),
    #[error("unsupported control request {0}")]
    UnsupportedControlRequest(u8),
}

/// ### Command Error
///
/// Command-level errors reported back to the interpreter, using the
/// IEEE 488.2 / SCPI error numbering.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("-113, \"Undefined header\"")]
    UndefinedHeader,
}

impl CommandError {
    /// The numeric error code, as it would appear in `SYSTem:ERRor?`
    pub fn code(&self) -> i16 {
        match self {
            CommandError::UndefinedHeader => -113,
        }
    }
}
