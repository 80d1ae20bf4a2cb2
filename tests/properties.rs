//! Reassembly, chunking and reset properties over generated inputs.

mod common;

use common::*;

use proptest::prelude::*;
use usbtmc_bridge::{
    BulkInStatus, Error, StatusBits, TransferState, UsbtmcDevice, COMMAND_BUFFER_SIZE,
    REPLY_BUFFER_SIZE,
};

fn fragments(max_total: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 1..12)
        .prop_filter("fits", move |f| f.iter().map(Vec::len).sum::<usize>() <= max_total)
}

#[derive(Debug, Clone, Copy)]
enum Abort {
    BulkIn,
    BulkOut,
    CheckBulkIn,
    CheckBulkOut,
}

fn abort() -> impl Strategy<Value = Abort> {
    prop_oneof![
        Just(Abort::BulkIn),
        Just(Abort::BulkOut),
        Just(Abort::CheckBulkIn),
        Just(Abort::CheckBulkOut),
    ]
}

proptest! {
    #[test]
    fn reassembled_command_is_the_concatenation(parts in fragments(COMMAND_BUFFER_SIZE)) {
        let mut device = device();
        let total: usize = parts.iter().map(Vec::len).sum();
        device.on_bulk_out_start(total).unwrap();

        let last = parts.len() - 1;
        for (i, part) in parts.iter().enumerate() {
            device.on_fragment_arrived(part, i == last).unwrap();
        }

        let expected: Vec<u8> = parts.concat();
        match expected.is_empty() {
            true => prop_assert!(device.interpreter().invoked.is_empty()),
            false => prop_assert_eq!(&device.interpreter().invoked, &vec![expected]),
        }
    }

    #[test]
    fn overflowing_fragments_abandon_the_cycle(
        parts in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..100), 3..10)
            .prop_filter("overflows", |f| f.iter().map(Vec::len).sum::<usize>() > COMMAND_BUFFER_SIZE)
    ) {
        let mut device = device();
        let last = parts.len() - 1;

        let mut overflowed = false;
        for (i, part) in parts.iter().enumerate() {
            if let Err(err) = device.on_fragment_arrived(part, i == last) {
                prop_assert_eq!(
                    err.downcast_ref::<Error>(),
                    Some(&Error::CommandOverflow { capacity: COMMAND_BUFFER_SIZE })
                );
                prop_assert!(device.command().is_empty());
                prop_assert_eq!(device.state(), TransferState::Idle);
                overflowed = true;
                break;
            }
        }

        prop_assert!(overflowed);
        prop_assert!(device.interpreter().invoked.is_empty());
    }

    #[test]
    fn chunks_cover_the_reply(len in 1..=REPLY_BUFFER_SIZE, chunk in 1usize..300) {
        init_logging();
        let reply = vec![b'r'; len];
        let interpreter = FakeInterpreter::new().reply(b"Q?", &[reply.as_slice()]);
        let mut device = UsbtmcDevice::new(interpreter, FakeTransport::default());

        send_command(&mut device, b"Q?");
        device.task();

        loop {
            prop_assert!(device.status().bits().contains(StatusBits::MAV));
            let status = device.on_bulk_in_requested(chunk);
            device.on_bulk_in_complete();
            match status {
                BulkInStatus::Transmitted { end_of_message: true, .. } => break,
                BulkInStatus::Transmitted { .. } => {}
                BulkInStatus::Withheld => prop_assert!(false, "request withheld mid-reply"),
            }
        }

        let sent = &device.transport().sent;
        prop_assert_eq!(sent.iter().map(|s| s.data.len()).sum::<usize>(), len);
        prop_assert!(sent.iter().all(|s| s.data.len() <= chunk));
        prop_assert!(sent[..sent.len() - 1].iter().all(|s| !s.end_of_message));
        prop_assert_eq!(sent.len(), len.div_ceil(chunk));
        prop_assert!(!device.status().bits().contains(StatusBits::MAV));
        prop_assert_eq!(device.state(), TransferState::Idle);
    }

    #[test]
    fn clear_then_aborts_leave_everything_reset(
        command in prop::sample::select(vec![&b"*IDN?"[..], &b"*RST"[..], &b"VOLT 3"[..]]),
        ticks in 0usize..3,
        request in prop::option::of(1usize..20),
        aborts in prop::collection::vec(abort(), 0..8),
    ) {
        let mut device = device();
        send_command(&mut device, command);
        for _ in 0..ticks {
            device.task();
        }
        if let Some(max_len) = request {
            device.on_bulk_in_requested(max_len);
        }
        device.status().set_bits(StatusBits::SRQ);

        device.on_clear();
        for abort in aborts {
            match abort {
                Abort::BulkIn => { device.on_abort_bulk_in(); }
                Abort::BulkOut => { device.on_abort_bulk_out(); }
                Abort::CheckBulkIn => { device.on_control_request(4, 0).unwrap(); }
                Abort::CheckBulkOut => { device.on_control_request(2, 0).unwrap(); }
            }
        }

        prop_assert_eq!(device.status().get(), 0);
        prop_assert_eq!(device.state(), TransferState::Idle);
        prop_assert!(device.command().is_empty());
        prop_assert_eq!(device.reply_len(), 0);
        prop_assert_eq!(device.transmitted(), 0);
    }
}
