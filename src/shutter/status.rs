//! Pure decode function for the shutter controller's status byte stream.
//!
//! Kept separate from the monitor loop (which owns the serial link, the
//! status mutex, and the clock) so the transition table can be unit- and
//! property-tested without any I/O or locking.

/// Status of one shutter side.
///
/// `Opening`/`Closing` are transient and only ever produced by the decoder;
/// a heartbeat trip forces both sides to `HeartbeatMonitorForceClosing`
/// regardless of whatever the decoder last reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterStatus {
    /// Fully closed.
    Closed,
    /// Fully open.
    Open,
    /// Neither fully open nor fully closed (aggregate byte, no per-side byte
    /// has pinned it to `Open` yet).
    PartiallyOpen,
    /// Controller-reported opening in progress (modern controller only).
    Opening,
    /// Controller-reported closing in progress (modern controller only).
    Closing,
    /// Forced closed by the heartbeat monitor's emergency trip.
    HeartbeatMonitorForceClosing,
}

impl Default for ShutterStatus {
    fn default() -> Self {
        ShutterStatus::Closed
    }
}

/// What a decoded byte meant, for logging purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeEvent {
    /// The shutter pair was updated.
    Updated,
    /// `'R'` — bumper guard relay reset. No status change.
    BumperReset,
    /// An unrecognized byte. No status change.
    Unknown(u8),
}

/// Decode one controller byte against the current `(a, b)` pair.
///
/// `legacy` selects the legacy controller's per-side transition mapping
/// (straight to `PartiallyOpen`) versus the modern controller's
/// (`Opening`/`Closing` transients).
pub fn decode_status_byte(
    byte: u8,
    legacy: bool,
    current: (ShutterStatus, ShutterStatus),
) -> ((ShutterStatus, ShutterStatus), DecodeEvent) {
    use ShutterStatus::*;
    let (a, b) = current;

    let demote_unless_open = |side: ShutterStatus| {
        if side == Open {
            Open
        } else {
            PartiallyOpen
        }
    };

    match byte {
        b'0' => ((Closed, Closed), DecodeEvent::Updated),
        b'1' => ((Closed, demote_unless_open(b)), DecodeEvent::Updated),
        b'2' => ((demote_unless_open(a), Closed), DecodeEvent::Updated),
        b'3' => (
            (demote_unless_open(a), demote_unless_open(b)),
            DecodeEvent::Updated,
        ),
        b'A' => (
            (if legacy { PartiallyOpen } else { Closing }, b),
            DecodeEvent::Updated,
        ),
        b'a' => (
            (if legacy { PartiallyOpen } else { Opening }, b),
            DecodeEvent::Updated,
        ),
        b'X' => ((Closed, b), DecodeEvent::Updated),
        b'x' => ((Open, b), DecodeEvent::Updated),
        b'B' => (
            (a, if legacy { PartiallyOpen } else { Closing }),
            DecodeEvent::Updated,
        ),
        b'b' => (
            (a, if legacy { PartiallyOpen } else { Opening }),
            DecodeEvent::Updated,
        ),
        b'Y' => ((a, Closed), DecodeEvent::Updated),
        b'y' => ((a, Open), DecodeEvent::Updated),
        b'R' => ((a, b), DecodeEvent::BumperReset),
        other => ((a, b), DecodeEvent::Unknown(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn all_statuses() -> [ShutterStatus; 6] {
        [
            ShutterStatus::Closed,
            ShutterStatus::Open,
            ShutterStatus::PartiallyOpen,
            ShutterStatus::Opening,
            ShutterStatus::Closing,
            ShutterStatus::HeartbeatMonitorForceClosing,
        ]
    }

    fn status_strategy() -> impl Strategy<Value = ShutterStatus> {
        prop_oneof![
            Just(ShutterStatus::Closed),
            Just(ShutterStatus::Open),
            Just(ShutterStatus::PartiallyOpen),
            Just(ShutterStatus::Opening),
            Just(ShutterStatus::Closing),
            Just(ShutterStatus::HeartbeatMonitorForceClosing),
        ]
    }

    #[test]
    fn zero_closes_both_unconditionally() {
        for a in all_statuses() {
            for b in all_statuses() {
                let ((ra, rb), event) = decode_status_byte(b'0', false, (a, b));
                assert_eq!(ra, ShutterStatus::Closed);
                assert_eq!(rb, ShutterStatus::Closed);
                assert_eq!(event, DecodeEvent::Updated);
            }
        }
    }

    #[test]
    fn per_side_opening_closing_modern() {
        let ((a, b), _) = decode_status_byte(b'a', false, (ShutterStatus::Closed, ShutterStatus::Closed));
        assert_eq!(a, ShutterStatus::Opening);
        assert_eq!(b, ShutterStatus::Closed);

        let ((a, b), _) = decode_status_byte(b'A', false, (ShutterStatus::Open, ShutterStatus::Closed));
        assert_eq!(a, ShutterStatus::Closing);
        assert_eq!(b, ShutterStatus::Closed);
    }

    #[test]
    fn per_side_legacy_goes_straight_to_partially_open() {
        let ((a, _), _) = decode_status_byte(b'a', true, (ShutterStatus::Closed, ShutterStatus::Closed));
        assert_eq!(a, ShutterStatus::PartiallyOpen);
        let ((a, _), _) = decode_status_byte(b'A', true, (ShutterStatus::Open, ShutterStatus::Closed));
        assert_eq!(a, ShutterStatus::PartiallyOpen);
    }

    #[test]
    fn limit_bytes_set_open_and_closed() {
        let ((a, b), _) = decode_status_byte(b'x', false, (ShutterStatus::Opening, ShutterStatus::Closed));
        assert_eq!(a, ShutterStatus::Open);
        assert_eq!(b, ShutterStatus::Closed);

        let ((a, b), _) = decode_status_byte(b'X', false, (ShutterStatus::Opening, ShutterStatus::Closed));
        assert_eq!(a, ShutterStatus::Closed);
        assert_eq!(b, ShutterStatus::Closed);
    }

    #[test]
    fn bumper_and_unknown_bytes_leave_status_unchanged() {
        let current = (ShutterStatus::PartiallyOpen, ShutterStatus::Open);
        let (next, event) = decode_status_byte(b'R', false, current);
        assert_eq!(next, current);
        assert_eq!(event, DecodeEvent::BumperReset);

        let (next, event) = decode_status_byte(b'?', false, current);
        assert_eq!(next, current);
        assert_eq!(event, DecodeEvent::Unknown(b'?'));
    }

    proptest! {
        #[test]
        fn aggregate_bytes_never_demote_open(
            byte in prop_oneof![Just(b'1'), Just(b'2'), Just(b'3')],
            a in status_strategy(),
            b in status_strategy(),
        ) {
            let ((ra, rb), _) = decode_status_byte(byte, false, (a, b));
            if a == ShutterStatus::Open {
                prop_assert_eq!(ra, ShutterStatus::Open);
            }
            if b == ShutterStatus::Open {
                prop_assert_eq!(rb, ShutterStatus::Open);
            }
        }

        #[test]
        fn decoder_output_is_always_a_valid_status(
            byte in any::<u8>(),
            legacy in any::<bool>(),
            a in status_strategy(),
            b in status_strategy(),
        ) {
            let ((ra, rb), _) = decode_status_byte(byte, legacy, (a, b));
            prop_assert!(all_statuses().contains(&ra));
            prop_assert!(all_statuses().contains(&rb));
        }
    }
}
