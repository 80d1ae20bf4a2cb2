//! Test doubles for the transport and the interpreter.

#![allow(dead_code)]

use std::collections::HashMap;

use usbtmc_bridge::{BulkInChunk, CommandError, Interpreter, Transport, UsbtmcDevice, Writeback};

pub const IDN_REPLY: &[u8] = b"ACME,M1,1,0\n";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A chunk as the transport received it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub header: [u8; 12],
    pub data: Vec<u8>,
    pub end_of_message: bool,
}

#[derive(Debug, Default)]
pub struct FakeTransport {
    pub reads_armed: usize,
    pub sent: Vec<Sent>,
    pub srqs: usize,
}

impl FakeTransport {
    /// Everything sent so far, concatenated
    pub fn payload(&self) -> Vec<u8> {
        self.sent.iter().flat_map(|s| s.data.clone()).collect()
    }
}

impl Transport for FakeTransport {
    fn start_bus_read(&mut self) {
        self.reads_armed += 1;
    }

    fn transmit(&mut self, chunk: BulkInChunk<'_>) {
        self.sent.push(Sent {
            header: chunk.header,
            data: chunk.data.to_vec(),
            end_of_message: chunk.end_of_message,
        });
    }

    fn send_srq(&mut self) {
        self.srqs += 1;
    }
}

/// Replies to known queries right away, stays silent otherwise.
///
/// Commands listed in `deferred` are answered only when `flush` is called,
/// the way an interpreter running on its own schedule would.
#[derive(Debug, Default)]
pub struct FakeInterpreter {
    pub invoked: Vec<Vec<u8>>,
    pub replies: HashMap<Vec<u8>, Vec<Vec<u8>>>,
    pub deferred: Vec<(Writeback, Vec<u8>)>,
    pub defer: bool,
    pub triggers: usize,
    pub trigger_supported: bool,
    pub pulses: usize,
    pub write_errors: usize,
    /// Error queue read back by `SYST:ERR?`
    pub errors: Vec<CommandError>,
}

impl FakeInterpreter {
    pub fn new() -> FakeInterpreter {
        FakeInterpreter::default().reply(b"*IDN?", &[IDN_REPLY])
    }

    /// Answer `command` with `parts`, written one after another
    pub fn reply(mut self, command: &[u8], parts: &[&[u8]]) -> FakeInterpreter {
        self.replies.insert(
            command.to_vec(),
            parts.iter().map(|p| p.to_vec()).collect(),
        );
        self
    }

    /// Write the replies of deferred commands now
    pub fn flush(&mut self) {
        for (writeback, command) in std::mem::take(&mut self.deferred) {
            self.answer(&command, &writeback);
        }
    }

    fn answer(&mut self, command: &[u8], writeback: &Writeback) {
        if command == b"SYST:ERR?" {
            let reply = match self.errors.is_empty() {
                true => "0, \"No error\"\n".to_string(),
                false => format!("{}\n", self.errors.remove(0)),
            };
            if writeback.write(reply.as_bytes()).is_err() {
                self.write_errors += 1;
            }
            return;
        }
        if let Some(parts) = self.replies.get(command) {
            for part in parts {
                if writeback.write(part).is_err() {
                    self.write_errors += 1;
                }
            }
        }
    }
}

impl Interpreter for FakeInterpreter {
    fn invoke(&mut self, command: &[u8], writeback: &Writeback) {
        self.invoked.push(command.to_vec());
        match self.defer {
            true => self.deferred.push((writeback.clone(), command.to_vec())),
            false => self.answer(command, writeback),
        }
    }

    fn trigger(&mut self) -> Result<(), CommandError> {
        self.triggers += 1;
        match self.trigger_supported {
            true => Ok(()),
            false => Err(CommandError::UndefinedHeader),
        }
    }

    fn indicator_pulse(&mut self) {
        self.pulses += 1;
    }

    fn push_error(&mut self, error: CommandError) {
        self.errors.push(error);
    }
}

pub type Device = UsbtmcDevice<FakeInterpreter, FakeTransport>;

pub fn device() -> Device {
    init_logging();
    UsbtmcDevice::new(FakeInterpreter::new(), FakeTransport::default())
}

/// Send `command` as a single final fragment, announced first
pub fn send_command(device: &mut Device, command: &[u8]) {
    device.on_bulk_out_start(command.len()).unwrap();
    device.on_fragment_arrived(command, true).unwrap();
}

/// A 12 byte bulk-OUT header as a host would build it
pub fn out_header(msg_id: u8, btag: u8, transfer_size: u32, attributes: u8) -> Vec<u8> {
    let mut header = vec![0u8; 12];
    header[0] = msg_id;
    header[1] = btag;
    header[2] = !btag;
    header[4..8].copy_from_slice(&transfer_size.to_le_bytes());
    header[8] = attributes;
    header
}
