//! The synchronization-and-transfer core of the push protocol.
//!
//! Everything here is written against the [`Channel`](crate::channel::Channel)
//! trait so the logic can be exercised against a scripted bootloader double.
//! The [`states`](super::states) module adapts these functions to a real
//! serial port.
//!
//! The wire protocol is receiver-driven: after the host is synchronized, the
//! device paces the transfer entirely with single status bytes. `0x41`
//! (ASCII `'A'`) asks the host to (re)send the current record; any other
//! value accepts it and advances. The host never learns *why* a record was
//! rejected, only that it must be resent.

use std::{thread, time::Duration};

use log::{debug, trace};

use crate::channel::{Channel, PushError};

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Continuation code asking the host to resend the current record. Any other
/// byte value advances the transfer.
pub(crate) const RETRY: u8 = 0x41;

/// A record with a deliberately wrong checksum.
///
/// The bootloader rejects it from every internal receiver state: wherever its
/// parser currently is, the record terminator forces it back to "awaiting
/// record", and the bad checksum guarantees the content is never applied.
pub(crate) const BAD_RECORD: &[u8] = b":020000041000EB\r";

/// Force the bootloader's receiver into the known "awaiting first record"
/// state, whatever state it is currently in.
///
/// Sends [`BAD_RECORD`] `repeats` times, pausing `settle` after each write
/// and draining one echoed status byte per iteration. A single bad record is
/// not enough: the device may be mid-way through receiving a multi-byte
/// record, and only a terminated record is guaranteed to reset its parser.
/// The drained byte count is not deterministic across device states, so the
/// accumulated backlog is purged afterwards in one go.
///
/// The final bad record is written without draining, which leaves exactly one
/// pending status byte in the input buffer. That byte seeds the record pump's
/// first continuation-code read.
pub(crate) fn synchronize(
    channel: &mut dyn Channel,
    repeats: usize,
    settle: Duration,
) -> Result<(), PushError> {
    debug!("synchronizing with {} bad-checksum records", repeats);

    let mut status = [0u8; 1];
    for _ in 0..repeats {
        channel.write_all(BAD_RECORD)?;
        thread::sleep(settle);
        channel.read_exact(&mut status)?;
    }

    channel.discard_input_buffer()?;

    channel.write_all(BAD_RECORD)?;
    thread::sleep(settle);

    Ok(())
}

/// Transfer `records` in order, one continuation code per attempt.
///
/// For each record the pump blocks on one status byte. [`RETRY`] reports
/// progress to `on_retry` as `(completed, total)` and resends the current
/// record verbatim, with no upper bound on repetitions; the device decides
/// when to stop asking. Any other byte advances to the next record. The
/// first read is satisfied by the pending status byte [`synchronize`] left
/// behind.
///
/// No record is written before every prior record has been accepted; the
/// blocking read before each write is the backpressure mechanism.
pub(crate) fn pump_records(
    channel: &mut dyn Channel,
    records: &[Vec<u8>],
    on_retry: &mut dyn FnMut(usize, usize),
) -> Result<(), PushError> {
    if records.is_empty() {
        return Err(PushError::EmptyImage);
    }

    let total = records.len();
    let mut code = [0u8; 1];
    for (index, record) in records.iter().enumerate() {
        loop {
            channel.read_exact(&mut code)?;
            if code[0] != RETRY {
                break;
            }
            trace!("device requested record {} of {}", index + 1, total);
            on_retry(index, total);
            channel.write_all(record)?;
        }
    }

    debug!("all {} records accepted", total);
    Ok(())
}

/// Surface whatever the device emits after the transfer.
///
/// Waits `settle` so the device can finish post-transfer work (jumping to the
/// application, printing a banner), then hands every byte currently available
/// to `sink`, one at a time, stopping as soon as the input buffer is empty.
/// The bytes are not interpreted.
pub(crate) fn drain_trailing(
    channel: &mut dyn Channel,
    settle: Duration,
    sink: &mut dyn FnMut(u8),
) -> Result<(), PushError> {
    thread::sleep(settle);

    let mut byte = [0u8; 1];
    while channel.bytes_available()? > 0 {
        channel.read_exact(&mut byte)?;
        sink(byte[0]);
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;

    use super::*;

    /// Receiver states the bootloader's record parser can be caught in when
    /// synchronization starts.
    #[derive(Clone, Copy, Debug, PartialEq)]
    enum ReceiverPhase {
        Idle,
        MidRecord,
        AwaitingChecksum,
    }

    /// Scripted stand-in for the device side of the serial link.
    ///
    /// Two usage modes. `in_phase` simulates the bootloader's receiver for
    /// synchronization tests: every terminated record it is written resets
    /// the parser to `Idle` and queues one rejection status byte. `scripted`
    /// plays back a fixed sequence of continuation codes for pump tests.
    struct FakeBootloader {
        phase: ReceiverPhase,
        /// Status bytes the host has not read yet.
        pending: VecDeque<u8>,
        /// Pre-scripted continuation codes, drawn after `pending` is empty.
        scripted: VecDeque<u8>,
        /// Whether a terminated write queues a status byte (sync mode).
        emits_status: bool,
        /// Every `write_all` payload, in order.
        writes: Vec<Vec<u8>>,
        /// Fail the nth `write_all` call with a transport error.
        fail_write_at: Option<usize>,
    }

    impl FakeBootloader {
        fn in_phase(phase: ReceiverPhase) -> Self {
            FakeBootloader {
                phase,
                pending: VecDeque::new(),
                scripted: VecDeque::new(),
                emits_status: true,
                writes: Vec::new(),
                fail_write_at: None,
            }
        }

        fn scripted(codes: &[u8]) -> Self {
            FakeBootloader {
                phase: ReceiverPhase::Idle,
                pending: VecDeque::new(),
                scripted: codes.iter().cloned().collect(),
                emits_status: false,
                writes: Vec::new(),
                fail_write_at: None,
            }
        }
    }

    impl Channel for FakeBootloader {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), PushError> {
            if self.fail_write_at == Some(self.writes.len()) {
                return Err(PushError::Transport(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "device removed",
                )));
            }
            self.writes.push(bytes.to_vec());

            if bytes.ends_with(b"\r") || bytes.ends_with(b"\n") {
                // A terminated record resets the parser, whatever phase it
                // was caught in, and the bad checksum draws a rejection.
                self.phase = ReceiverPhase::Idle;
                if self.emits_status {
                    self.pending.push_back(RETRY);
                }
            } else {
                self.phase = ReceiverPhase::MidRecord;
            }
            Ok(())
        }

        fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), PushError> {
            for slot in buf.iter_mut() {
                *slot = self
                    .pending
                    .pop_front()
                    .or_else(|| self.scripted.pop_front())
                    .ok_or(PushError::Stall)?;
            }
            Ok(())
        }

        fn bytes_available(&mut self) -> Result<usize, PushError> {
            Ok(self.pending.len() + self.scripted.len())
        }

        fn discard_input_buffer(&mut self) -> Result<(), PushError> {
            self.pending.clear();
            self.scripted.clear();
            Ok(())
        }
    }

    fn records(lines: &[&str]) -> Vec<Vec<u8>> {
        lines.iter().map(|l| l.as_bytes().to_vec()).collect()
    }

    fn ignore_progress(_completed: usize, _total: usize) {}

    #[test]
    fn sync_converges_from_any_receiver_phase() {
        for phase in [
            ReceiverPhase::Idle,
            ReceiverPhase::MidRecord,
            ReceiverPhase::AwaitingChecksum,
        ]
        .iter()
        {
            let mut device = FakeBootloader::in_phase(*phase);
            synchronize(&mut device, 10, Duration::from_millis(0)).unwrap();

            assert_eq!(device.phase, ReceiverPhase::Idle, "from {:?}", phase);
            assert_eq!(
                device.bytes_available().unwrap(),
                1,
                "exactly one status byte must be pending after sync from {:?}",
                phase
            );
        }
    }

    #[test]
    fn sync_purges_stale_input_backlog() {
        let mut device = FakeBootloader::in_phase(ReceiverPhase::MidRecord);
        // Garbage already sitting in the host's input buffer before sync.
        device.pending.extend(b"boot banner".iter());

        synchronize(&mut device, 10, Duration::from_millis(0)).unwrap();

        assert_eq!(device.bytes_available().unwrap(), 1);
        // Only bad-checksum records went on the wire.
        assert!(device.writes.iter().all(|w| w == BAD_RECORD));
        assert_eq!(device.writes.len(), 11);
    }

    #[test]
    fn retry_code_resends_the_same_record() {
        let image = records(&["L1\n"]);
        // Three resend requests, then acceptance.
        let mut device = FakeBootloader::scripted(&[RETRY, RETRY, RETRY, b'B']);

        pump_records(&mut device, &image, &mut ignore_progress).unwrap();

        assert_eq!(device.writes, vec![b"L1\n".to_vec(); 3]);
    }

    #[test]
    fn records_are_written_in_input_order() {
        let image = records(&["L1\n", "L2\n", "L3\n", "L4\n"]);
        let mut device = FakeBootloader::scripted(&[
            RETRY, b'B', // L1
            RETRY, RETRY, RETRY, b'B', // L2, resent twice
            RETRY, b'B', // L3
            RETRY, b'B', // L4
        ]);

        pump_records(&mut device, &image, &mut ignore_progress).unwrap();

        let mut deduped = device.writes.clone();
        deduped.dedup();
        assert_eq!(deduped, image);
    }

    #[test]
    fn progress_is_monotonic_and_bounded() {
        let image = records(&["L1\n", "L2\n", "L3\n"]);
        let mut device = FakeBootloader::scripted(&[
            RETRY, RETRY, b'B', RETRY, b'B', RETRY, RETRY, RETRY, b'B',
        ]);

        let mut seen: Vec<(usize, usize)> = Vec::new();
        pump_records(&mut device, &image, &mut |completed, total| {
            seen.push((completed, total))
        })
        .unwrap();

        assert!(!seen.is_empty());
        let mut last = 0;
        for (completed, total) in seen {
            assert_eq!(total, 3);
            assert!(completed >= last);
            assert!(completed < total);
            last = completed;
        }
    }

    #[test]
    fn write_failure_aborts_without_touching_later_records() {
        let image = records(&["L1\n", "L2\n", "L3\n"]);
        let mut device = FakeBootloader::scripted(&[RETRY, b'B', RETRY, b'B', RETRY, b'B']);
        // First write is L1; the second (L2) hits a dead link.
        device.fail_write_at = Some(1);

        let result = pump_records(&mut device, &image, &mut ignore_progress);

        match result {
            Err(PushError::Transport(_)) => {}
            other => panic!("expected a transport error, got {:?}", other),
        }
        assert_eq!(device.writes, vec![b"L1\n".to_vec()]);
    }

    #[test]
    fn silent_device_surfaces_a_stall() {
        let image = records(&["L1\n", "L2\n"]);
        // Enough codes for L1 only; the device then goes quiet.
        let mut device = FakeBootloader::scripted(&[RETRY, b'B']);

        let result = pump_records(&mut device, &image, &mut ignore_progress);

        match result {
            Err(PushError::Stall) => {}
            other => panic!("expected a stall, got {:?}", other),
        }
    }

    #[test]
    fn empty_image_is_rejected_before_any_channel_traffic() {
        let mut device = FakeBootloader::scripted(&[RETRY, b'B']);

        let result = pump_records(&mut device, &[], &mut ignore_progress);

        match result {
            Err(PushError::EmptyImage) => {}
            other => panic!("expected the empty-image error, got {:?}", other),
        }
        assert!(device.writes.is_empty());
        assert_eq!(device.scripted.len(), 2);
    }

    #[test]
    fn three_record_push_with_one_resend() {
        let image = records(&["L1\n", "L2\n", "L3\n"]);
        let mut device =
            FakeBootloader::scripted(&[RETRY, b'B', RETRY, RETRY, b'B', RETRY, b'B']);

        let mut seen: Vec<(usize, usize)> = Vec::new();
        pump_records(&mut device, &image, &mut |completed, total| {
            seen.push((completed, total))
        })
        .unwrap();

        assert_eq!(
            device.writes,
            vec![
                b"L1\n".to_vec(),
                b"L2\n".to_vec(),
                b"L2\n".to_vec(),
                b"L3\n".to_vec(),
            ]
        );
        assert_eq!(seen, vec![(0, 3), (1, 3), (1, 3), (2, 3)]);
    }

    #[test]
    fn drain_surfaces_every_trailing_byte() {
        let mut device = FakeBootloader::scripted(b"app v1.0 booted\r\n");

        let mut tail = Vec::new();
        drain_trailing(&mut device, Duration::from_millis(0), &mut |byte| {
            tail.push(byte)
        })
        .unwrap();

        assert_eq!(tail, b"app v1.0 booted\r\n".to_vec());
        assert_eq!(device.bytes_available().unwrap(), 0);
    }

    #[test]
    fn drain_with_no_trailing_output_is_a_no_op() {
        let mut device = FakeBootloader::scripted(&[]);

        let mut tail = Vec::new();
        drain_trailing(&mut device, Duration::from_millis(0), &mut |byte| {
            tail.push(byte)
        })
        .unwrap();

        assert!(tail.is_empty());
    }
}
