//! Bulk
//!
//! Command reassembly on the bulk-OUT endpoint and the reply state machine
//! serving the bulk-IN endpoint.
//!

use crate::communication::header::device_dependent_msg_in_header;
use crate::constants::misc;
use crate::error::Error;
use crate::types::{BulkInChunk, BulkInStatus, Source, StatusBits, TransferState};
use crate::{Interpreter, Transport, UsbtmcDevice};

use anyhow::Result;

/// A bulk-IN request from the host, outstanding until its transfer completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BulkInRequest {
    /// Most bytes the host accepts in this transfer
    pub(crate) max_len: usize,
    pub(crate) btag: u8,
    /// A chunk went out for this request and its completion is awaited
    pub(crate) transmitted: bool,
}

/// Progress of the message being drained on bulk-IN
#[derive(Debug, Default)]
pub(crate) struct BulkInProgress {
    pub(crate) request: Option<BulkInRequest>,
    /// The buffer being drained, once chosen
    pub(crate) source: Option<Source>,
    /// Bytes of `source` already handed to the transport
    pub(crate) tx_cursor: usize,
}

impl BulkInProgress {
    /// Forget the message being drained, keeping any outstanding request.
    pub(crate) fn rewind(&mut self) {
        self.source = None;
        self.tx_cursor = 0;
    }
}

impl<I: Interpreter, T: Transport> UsbtmcDevice<I, T> {
    /// ### On Bulk Out Start
    ///
    /// A new DEV_DEP_MSG_OUT transfer announces its size. Starts a new
    /// command cycle.
    ///
    /// A reply the host never read is dropped here.
    ///
    /// #### Arguments
    /// - `transfer_size` -> total size of the command announced by the host
    ///
    /// #### Returns
    /// `Err(TransferTooLarge)` if the command cannot fit, before any byte is taken
    ///
    pub fn on_bulk_out_start(&mut self, transfer_size: usize) -> Result<()> {
        self.begin_command();

        if transfer_size > misc::COMMAND_BUFFER_SIZE {
            log::warn!(
                "refusing bulk out transfer of {} bytes (buffer holds {})",
                transfer_size,
                misc::COMMAND_BUFFER_SIZE
            );
            return Err(Error::TransferTooLarge {
                requested: transfer_size,
                capacity: misc::COMMAND_BUFFER_SIZE,
            }
            .into());
        }

        Ok(())
    }

    /// ### On Fragment Arrived
    ///
    /// Append a fragment of the current command. On the final fragment the
    /// complete command is handed to the interpreter.
    ///
    /// #### Arguments
    /// - `data` -> the fragment payload
    /// - `transfer_complete` -> this fragment ends the command
    ///
    /// #### Returns
    /// `Err(CommandOverflow)` if the fragment does not fit. The cycle is then
    /// abandoned and the command buffer is empty; the remaining fragments of
    /// the same transfer are refused the same way.
    ///
    pub fn on_fragment_arrived(&mut self, data: &[u8], transfer_complete: bool) -> Result<()> {
        if self.command_complete {
            self.begin_command();
        }

        if self.discarding {
            log::trace!("dropping {} bytes of an abandoned command", data.len());
            self.discarding = !transfer_complete;
            return Err(Error::CommandOverflow {
                capacity: misc::COMMAND_BUFFER_SIZE,
            }
            .into());
        }

        if self.command.extend_from_slice(data).is_err() {
            log::warn!(
                "command overflow: {} + {} bytes, abandoning cycle",
                self.command.len(),
                data.len()
            );
            self.discarding = !transfer_complete;
            self.command.clear();
            self.state = TransferState::Idle;
            self.bulk_in.rewind();
            return Err(Error::CommandOverflow {
                capacity: misc::COMMAND_BUFFER_SIZE,
            }
            .into());
        }
        log::trace!(
            "bulk out fragment of {} bytes ({} total)",
            data.len(),
            self.command.len()
        );

        if transfer_complete {
            self.command_complete = true;
            self.state = TransferState::CommandReceived;
            self.bulk_in.rewind();
            // anything written while the command was still arriving is stale
            self.drop_reply();

            if !self.command.is_empty() {
                log::debug!("command of {} bytes received", self.command.len());
                self.writeback.reply.borrow_mut().closed = false;
                self.interpreter.invoke(&self.command, &self.writeback);
            }
        }

        self.transport.start_bus_read();
        Ok(())
    }

    /// ### On Bulk In Requested
    ///
    /// The host asks for up to `max_len` bytes of the response.
    ///
    /// The request is withheld (the transport NAKs) while there is nothing to
    /// send yet; the task tick serves it once a reply exists. A second
    /// request while one is outstanding is a protocol violation and is
    /// withheld as well.
    ///
    /// #### Arguments
    /// - `max_len` -> the TransferSize of the REQUEST_DEV_DEP_MSG_IN
    ///
    pub fn on_bulk_in_requested(&mut self, max_len: usize) -> BulkInStatus {
        self.request_bulk_in(max_len, 0)
    }

    pub(crate) fn request_bulk_in(&mut self, max_len: usize, btag: u8) -> BulkInStatus {
        if let Some(request) = self.bulk_in.request {
            log::warn!(
                "bulk in request while another is outstanding (bTag {})",
                request.btag
            );
            return BulkInStatus::Withheld;
        }

        self.bulk_in.request = Some(BulkInRequest {
            max_len,
            btag,
            transmitted: false,
        });

        match self.state {
            TransferState::ReadyToReply => self.transmit_next(),
            _ => {
                log::trace!("bulk in request withheld while {:?}", self.state);
                BulkInStatus::Withheld
            }
        }
    }

    /// ### On Bulk In Complete
    ///
    /// The last chunk handed to the transport reached the host. Once the
    /// whole message is out, MAV is cleared and the cycle is over.
    ///
    /// A completion with no chunk in flight is ignored; a withheld request
    /// stays outstanding until it is served.
    ///
    pub fn on_bulk_in_complete(&mut self) {
        if !self.bulk_in.request.is_some_and(|r| r.transmitted) {
            log::debug!("bulk in complete without a transfer in flight, ignored");
            return;
        }
        self.bulk_in.request = None;

        if let Some(source) = self.bulk_in.source {
            if self.bulk_in.tx_cursor >= self.source_len(source) {
                log::debug!("{:?} of {} bytes sent", source, self.bulk_in.tx_cursor);
                if source == Source::Reply {
                    self.drop_reply();
                }
                self.close_reply();
                self.bulk_in.rewind();
                self.state = TransferState::Idle;
            }
        }

        self.transport.start_bus_read();
    }

    /// ### Task
    ///
    /// Advance the cycle by one step. Call regularly from the main loop.
    ///
    /// A received command moves to ReadyToReply on the first tick after it
    /// was invoked. If no reply was written by then, none is expected and
    /// the cycle ends, unless a waiting bulk-IN request gets the command
    /// echoed back.
    ///
    pub fn task(&mut self) {
        let (overflowed, srq_requested) = {
            let mut reply = self.writeback.reply.borrow_mut();
            let flags = (reply.overflowed, reply.srq_requested);
            reply.srq_requested = false;
            flags
        };

        if srq_requested {
            self.transport.send_srq();
        }

        if overflowed && self.state != TransferState::Idle {
            log::warn!("reply overflowed, abandoning cycle");
            self.close_reply();
            self.state = TransferState::Idle;
            self.bulk_in.rewind();
            return;
        }

        match self.state {
            TransferState::Idle => {}
            TransferState::CommandReceived => {
                self.state = TransferState::ReadyToReply;
                self.ready_to_reply();
            }
            TransferState::ReadyToReply => self.ready_to_reply(),
        }
    }

    fn ready_to_reply(&mut self) {
        if self
            .bulk_in
            .request
            .is_some_and(|request| !request.transmitted)
        {
            self.transmit_next();
        }

        if self.state == TransferState::ReadyToReply
            && self.bulk_in.source.is_none()
            && self.writeback.is_empty()
        {
            log::debug!("command produced no reply");
            self.close_reply();
            self.state = TransferState::Idle;
        }
    }

    /// Send the next chunk of the message for the outstanding request.
    fn transmit_next(&mut self) -> BulkInStatus {
        let Some(request) = self.bulk_in.request else {
            return BulkInStatus::Withheld;
        };
        if request.transmitted {
            return BulkInStatus::Withheld;
        }

        let source = match self.bulk_in.source {
            Some(source) => source,
            None => match self.choose_source() {
                Some(source) => {
                    self.bulk_in.source = Some(source);
                    source
                }
                None => return BulkInStatus::Withheld,
            },
        };

        let start = self.bulk_in.tx_cursor;
        let total = self.source_len(source);
        let len = (total - start).min(request.max_len);
        let end_of_message = start + len == total;
        let header = device_dependent_msg_in_header(request.btag, len as u32, end_of_message);

        match source {
            Source::Reply => {
                let mut reply = self.writeback.reply.borrow_mut();
                reply.in_flight = true;
                self.transport.transmit(BulkInChunk {
                    header,
                    data: &reply.buffer[start..start + len],
                    end_of_message,
                });
            }
            Source::Command => {
                self.transport.transmit(BulkInChunk {
                    header,
                    data: &self.command[start..start + len],
                    end_of_message,
                });
            }
        }
        log::trace!(
            "bulk in chunk {}..{} of {:?}, eom {}",
            start,
            start + len,
            source,
            end_of_message
        );

        self.bulk_in.tx_cursor += len;
        self.bulk_in.request = Some(BulkInRequest {
            transmitted: true,
            ..request
        });

        BulkInStatus::Transmitted {
            len,
            end_of_message,
        }
    }

    fn choose_source(&self) -> Option<Source> {
        if !self.writeback.is_empty() {
            Some(Source::Reply)
        } else if self.config.echo_unanswered_commands && !self.command.is_empty() {
            log::debug!("no reply, echoing the command back");
            Some(Source::Command)
        } else {
            None
        }
    }

    fn source_len(&self, source: Source) -> usize {
        match source {
            Source::Reply => self.writeback.len(),
            Source::Command => self.command.len(),
        }
    }

    /// Empty the command buffer for a new cycle, dropping an unread reply.
    fn begin_command(&mut self) {
        self.command.clear();
        self.command_complete = false;
        self.discarding = false;
        self.close_reply();

        if self.state != TransferState::Idle || !self.writeback.is_empty() {
            log::debug!("new command while {:?}, dropping unread reply", self.state);
            self.drop_reply();
            self.bulk_in.rewind();
            self.state = TransferState::Idle;
        }
    }

    /// Empty the reply buffer and clear MAV.
    pub(crate) fn drop_reply(&mut self) {
        self.writeback.reply.borrow_mut().reset();
        self.status.clear_bits(StatusBits::MAV);
    }

    /// Refuse reply writes until the next command is invoked.
    pub(crate) fn close_reply(&self) {
        self.writeback.reply.borrow_mut().closed = true;
    }
}
