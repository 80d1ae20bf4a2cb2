//! Header
//!
//! Codec for the 12 byte headers in front of every bulk transfer, seen from
//! the device: bulk-OUT headers are parsed, DEV_DEP_MSG_IN headers are built.
//!

use crate::constants::{bulk_msg_id, misc, transfer_attributes};
use crate::error::Error;

use anyhow::Result;

/// ### Bulk Out Header
///
/// A decoded bulk-OUT header.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOutHeader {
    /// A command message (or part of one) follows the header
    DevDepMsgOut {
        btag: u8,
        transfer_size: u32,
        end_of_message: bool,
    },
    /// The host asks for up to `transfer_size` bytes on the bulk-IN endpoint
    RequestDevDepMsgIn {
        btag: u8,
        transfer_size: u32,
        term_char: Option<u8>,
    },
    /// USB488 TRIGGER
    Trigger { btag: u8 },
}

impl BulkOutHeader {
    /// ### Parse
    ///
    /// Decode the header at the start of `bytes`. Anything after the first
    /// 12 bytes is payload and is ignored here.
    ///
    pub fn parse(bytes: &[u8]) -> Result<BulkOutHeader> {
        if bytes.len() < misc::USBTMC_HEADER_SIZE {
            return Err(Error::HeaderTooShort(bytes.len()).into());
        }

        let msg_id = bytes[0];
        let btag = bytes[1];
        let inverse = bytes[2];
        if btag != !inverse {
            return Err(Error::InvalidBTag { btag, inverse }.into());
        }

        let transfer_size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let attributes = bytes[8];

        let header = match msg_id {
            bulk_msg_id::DEVICE_DEPENDENT_MSG_OUT => BulkOutHeader::DevDepMsgOut {
                btag,
                transfer_size,
                end_of_message: attributes & transfer_attributes::EOM != 0,
            },
            bulk_msg_id::REQUEST_DEVICE_DEPENDENT_MSG_IN => BulkOutHeader::RequestDevDepMsgIn {
                btag,
                transfer_size,
                term_char: match attributes & transfer_attributes::TERM_CHAR_ENABLED != 0 {
                    true => Some(bytes[9]),
                    false => None,
                },
            },
            bulk_msg_id::TRIGGER => BulkOutHeader::Trigger { btag },
            other => return Err(Error::UnknownMsgId(other).into()),
        };

        Ok(header)
    }

    pub fn btag(&self) -> u8 {
        match *self {
            BulkOutHeader::DevDepMsgOut { btag, .. }
            | BulkOutHeader::RequestDevDepMsgIn { btag, .. }
            | BulkOutHeader::Trigger { btag } => btag,
        }
    }
}

/// ### Device Dependent Message In Header
///
/// Build the header of a DEV_DEP_MSG_IN transfer answering the request
/// tagged `btag`.
///
pub fn device_dependent_msg_in_header(
    btag: u8,
    transfer_size: u32,
    end_of_message: bool,
) -> [u8; misc::USBTMC_HEADER_SIZE] {
    let mut header = [0x00; misc::USBTMC_HEADER_SIZE];

    header[0] = bulk_msg_id::DEVICE_DEPENDENT_MSG_IN;
    header[1] = btag;
    header[2] = !btag;
    header[4..8].copy_from_slice(&transfer_size.to_le_bytes());

    if end_of_message {
        header[8] = transfer_attributes::EOM;
    }

    header
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out_header(msg_id: u8, btag: u8, transfer_size: u32, attributes: u8) -> [u8; 12] {
        let mut header = [0u8; 12];
        header[0] = msg_id;
        header[1] = btag;
        header[2] = !btag;
        header[4..8].copy_from_slice(&transfer_size.to_le_bytes());
        header[8] = attributes;
        header
    }

    #[test]
    fn test_parse_dev_dep_msg_out() {
        let header = out_header(1, 7, 5, 0x01);
        assert_eq!(
            BulkOutHeader::parse(&header).unwrap(),
            BulkOutHeader::DevDepMsgOut {
                btag: 7,
                transfer_size: 5,
                end_of_message: true
            }
        );
    }

    #[test]
    fn test_parse_request_with_term_char() {
        let mut header = out_header(2, 0x42, 0x0102_0304, 0x02);
        header[9] = b'\n';

        let parsed = BulkOutHeader::parse(&header).unwrap();
        assert_eq!(
            parsed,
            BulkOutHeader::RequestDevDepMsgIn {
                btag: 0x42,
                transfer_size: 0x0102_0304,
                term_char: Some(b'\n')
            }
        );
        assert_eq!(parsed.btag(), 0x42);
    }

    #[test]
    fn test_parse_trigger_ignores_payload() {
        let mut bytes = out_header(128, 3, 0, 0).to_vec();
        bytes.extend_from_slice(b"junk");
        assert_eq!(
            BulkOutHeader::parse(&bytes).unwrap(),
            BulkOutHeader::Trigger { btag: 3 }
        );
    }

    #[test]
    fn test_parse_rejects_bad_headers() {
        let err = BulkOutHeader::parse(&[1, 2, 3]).unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&Error::HeaderTooShort(3)));

        let mut header = out_header(1, 9, 1, 0);
        header[2] = 0;
        let err = BulkOutHeader::parse(&header).unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::InvalidBTag { btag: 9, inverse: 0 })
        );

        let header = out_header(126, 1, 0, 0);
        let err = BulkOutHeader::parse(&header).unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&Error::UnknownMsgId(126)));
    }

    #[test]
    fn test_msg_in_header_layout() {
        let header = device_dependent_msg_in_header(0x10, 300, true);
        assert_eq!(
            header,
            [0x02, 0x10, 0xEF, 0x00, 0x2C, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]
        );

        let header = device_dependent_msg_in_header(1, 8, false);
        assert_eq!(header[8], 0x00);
    }
}
