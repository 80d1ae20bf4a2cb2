//! ## Control
//!
//! Class control requests answered by the device: clear, abort, status byte,
//! capabilities and indicator pulse.
//!

use crate::constants::{control_requests, misc, usbtmc_status};
use crate::error::Error;
use crate::init::Capabilities;
use crate::types::{Source, TransferState};
use crate::{Interpreter, Transport, UsbtmcDevice};

use anyhow::Result;

/// Bytes moved by the last aborted transfers, reported by CHECK_ABORT_*_STATUS
#[derive(Debug, Default)]
pub(crate) struct AbortCounts {
    pub(crate) bulk_in: u32,
    pub(crate) bulk_out: u32,
}

impl<I: Interpreter, T: Transport> UsbtmcDevice<I, T> {
    /// ### On Clear
    ///
    /// Reset the whole pipeline: state back to Idle, both buffers emptied,
    /// status byte zeroed.
    ///
    pub fn on_clear(&mut self) {
        log::debug!("clear");
        self.state = TransferState::Idle;
        self.bulk_in = Default::default();
        self.command.clear();
        self.command_complete = false;
        self.discarding = false;
        {
            let mut reply = self.writeback.reply.borrow_mut();
            reply.reset();
            reply.srq_requested = false;
            reply.closed = true;
        }
        self.status.set(0);
    }

    /// ### On Abort Bulk In
    ///
    /// Cancel the bulk-IN transfer in progress. The message being drained is
    /// discarded; the command buffer is left alone.
    ///
    /// #### Returns
    /// The number of bytes of the message sent before the abort
    ///
    pub fn on_abort_bulk_in(&mut self) -> usize {
        let transmitted = self.bulk_in.tx_cursor;
        self.bulk_in.request = None;

        if let Some(source) = self.bulk_in.source {
            log::debug!("bulk in aborted after {} bytes of {:?}", transmitted, source);
            if source == Source::Reply {
                self.drop_reply();
            }
            self.close_reply();
            self.bulk_in.rewind();
            self.state = TransferState::Idle;
        }

        self.aborted.bulk_in = transmitted as u32;
        transmitted
    }

    /// ### On Abort Bulk Out
    ///
    /// Cancel the bulk-OUT transfer in progress and accept new ones. A
    /// partially received command is discarded.
    ///
    /// #### Returns
    /// The number of bytes of the command received before the abort
    ///
    pub fn on_abort_bulk_out(&mut self) -> usize {
        let received = match self.command_complete {
            true => 0,
            false => {
                let received = self.command.len();
                if received > 0 {
                    log::debug!("bulk out aborted after {} bytes", received);
                }
                self.command.clear();
                received
            }
        };

        self.discarding = false;
        self.aborted.bulk_out = received as u32;
        self.transport.start_bus_read();
        received
    }

    /// ### On Bulk Out Clear Feature
    ///
    /// The host cleared a halt on bulk-OUT: listen again.
    ///
    pub fn on_bulk_out_clear_feature(&mut self) {
        self.transport.start_bus_read();
    }

    /// ### Get Status Byte
    ///
    /// Read the status byte for the host. SRQ is cleared by the read.
    ///
    pub fn get_status_byte(&mut self) -> u8 {
        self.status.read_and_clear_srq()
    }

    /// ### On Indicator Pulse
    ///
    /// Forwarded to the interpreter as is.
    ///
    pub fn on_indicator_pulse(&mut self) {
        self.interpreter.indicator_pulse();
    }

    /// ### On Control Request
    ///
    /// Answer a USBTMC class request addressed to the interface or one of its
    /// bulk endpoints.
    ///
    /// #### Arguments
    /// - `b_request` -> the bRequest of the setup packet
    /// - `w_value` -> the wValue of the setup packet (bTag for abort and status requests)
    ///
    /// #### Returns
    /// The bytes of the data stage
    ///
    pub fn on_control_request(&mut self, b_request: u8, w_value: u16) -> Result<Vec<u8>> {
        let btag = (w_value & 0x00FF) as u8;

        let response = match b_request {
            control_requests::INITIATE_ABORT_BULK_OUT => {
                self.on_abort_bulk_out();
                vec![usbtmc_status::STATUS_SUCCESS, btag]
            }
            control_requests::CHECK_ABORT_BULK_OUT_STATUS => {
                let mut response = vec![usbtmc_status::STATUS_SUCCESS, 0x00, 0x00, 0x00];
                response.extend_from_slice(&self.aborted.bulk_out.to_le_bytes());
                response
            }
            control_requests::INITIATE_ABORT_BULK_IN => {
                let in_progress = self.bulk_in.request.is_some() || self.bulk_in.source.is_some();
                self.on_abort_bulk_in();
                let status = match in_progress {
                    true => usbtmc_status::STATUS_SUCCESS,
                    false => usbtmc_status::STATUS_TRANSFER_NOT_IN_PROGRESS,
                };
                vec![status, btag]
            }
            control_requests::CHECK_ABORT_BULK_IN_STATUS => {
                self.transport.start_bus_read();
                // bmAbortBulkIn: nothing is ever left queued in the FIFO
                let mut response = vec![usbtmc_status::STATUS_SUCCESS, 0x00, 0x00, 0x00];
                response.extend_from_slice(&self.aborted.bulk_in.to_le_bytes());
                response
            }
            control_requests::INITIATE_CLEAR => {
                self.on_clear();
                vec![usbtmc_status::STATUS_SUCCESS]
            }
            control_requests::CHECK_CLEAR_STATUS => {
                vec![usbtmc_status::STATUS_SUCCESS, 0x00]
            }
            control_requests::GET_CAPABILITIES => {
                capabilities_response(&self.config.capabilities).to_vec()
            }
            control_requests::INDICATOR_PULSE => {
                match self.config.capabilities.accepts_indicator_pulse_request {
                    true => {
                        self.on_indicator_pulse();
                        vec![usbtmc_status::STATUS_SUCCESS]
                    }
                    false => vec![usbtmc_status::STATUS_FAILED],
                }
            }
            control_requests::READ_STATUS_BYTE => {
                vec![usbtmc_status::STATUS_SUCCESS, btag, self.get_status_byte()]
            }
            other => {
                log::warn!("unsupported control request {}", other);
                return Err(Error::UnsupportedControlRequest(other).into());
            }
        };

        Ok(response)
    }
}

/// ### Capabilities Response
///
/// Encode the data stage of GET_CAPABILITIES for a USB488 interface.
///
pub fn capabilities_response(
    capabilities: &Capabilities,
) -> [u8; misc::CAPABILITIES_RESPONSE_SIZE] {
    let mut buffer = [0x00; misc::CAPABILITIES_RESPONSE_SIZE];

    buffer[0] = usbtmc_status::STATUS_SUCCESS;
    buffer[2..4].copy_from_slice(&capabilities.bcd_usbtmc.to_le_bytes());

    buffer[4] = flag(capabilities.accepts_indicator_pulse_request, 2)
        | flag(capabilities.is_talk_only, 1)
        | flag(capabilities.is_listen_only, 0);
    buffer[5] = flag(capabilities.supports_bulk_in_term_char, 0);

    buffer[12..14].copy_from_slice(&capabilities.bcd_usb488.to_le_bytes());
    buffer[14] = flag(capabilities.is_488_2, 2)
        | flag(capabilities.supports_ren_gtl_llo, 1)
        | flag(capabilities.supports_trigger, 0);
    buffer[15] = flag(capabilities.scpi, 3)
        | flag(capabilities.sr1, 2)
        | flag(capabilities.rl1, 1)
        | flag(capabilities.dt1, 0);

    buffer
}

fn flag(set: bool, bit: u8) -> u8 {
    (set as u8) << bit
}
