//! ## Constants
//!
//! Various constants used throughout the project.
//!

pub mod usb {
    /// The class code for usbtmc
    pub const USBTMC_CLASS_CODE: u8 = 0xFE;
    /// The subclass code for usbtmc
    pub const USBTMC_SUBCLASS_CODE: u8 = 0x03;
    /// The protocol code of a USB488 interface
    pub const USBTMC_PROTOCOL_CODE: u8 = 0x01;
    /// USBTMC specification release implemented (BCD)
    pub const USBTMC_VERSION: u16 = 0x0100;
    /// USB488 subclass specification release implemented (BCD)
    pub const USB488_VERSION: u16 = 0x0100;
}

pub mod misc {
    /// The size in bytes of a USBTMC header in a bulk transfer
    pub const USBTMC_HEADER_SIZE: usize = 12;
    /// Capacity of the command reassembly buffer. A few packets long should be enough.
    pub const COMMAND_BUFFER_SIZE: usize = 225;
    /// Capacity of the reply buffer the interpreter writes into
    pub const REPLY_BUFFER_SIZE: usize = 256;
    /// Size of the GET_CAPABILITIES response for a USB488 interface
    pub const CAPABILITIES_RESPONSE_SIZE: usize = 0x18;
}

pub mod usbtmc_status {
    /// Success
    pub const STATUS_SUCCESS: u8 = 0x01;
    /// Failure for unspecified or undefined reason
    pub const STATUS_FAILED: u8 = 0x80;
    /// The device received an INITIATE_ABORT request, but the request is not in progress
    pub const STATUS_TRANSFER_NOT_IN_PROGRESS: u8 = 0x81;
}

pub mod control_requests {
    pub const INITIATE_ABORT_BULK_OUT: u8 = 1;
    pub const CHECK_ABORT_BULK_OUT_STATUS: u8 = 2;
    pub const INITIATE_ABORT_BULK_IN: u8 = 3;
    pub const CHECK_ABORT_BULK_IN_STATUS: u8 = 4;
    pub const INITIATE_CLEAR: u8 = 5;
    pub const CHECK_CLEAR_STATUS: u8 = 6;
    pub const GET_CAPABILITIES: u8 = 7;
    pub const INDICATOR_PULSE: u8 = 64;
    pub const READ_STATUS_BYTE: u8 = 128;
}

pub mod bulk_msg_id {
    pub const DEVICE_DEPENDENT_MSG_OUT: u8 = 1;
    pub const REQUEST_DEVICE_DEPENDENT_MSG_IN: u8 = 2;
    pub const DEVICE_DEPENDENT_MSG_IN: u8 = 2;
    /// USB488 subclass TRIGGER message
    pub const TRIGGER: u8 = 128;
}

/// Bits of the bmTransferAttributes byte of a bulk header
pub mod transfer_attributes {
    /// Last transfer of a message
    pub const EOM: u8 = 0b0000_0001;
    /// The bulk-IN request carries a termination character
    pub const TERM_CHAR_ENABLED: u8 = 0b0000_0010;
}
