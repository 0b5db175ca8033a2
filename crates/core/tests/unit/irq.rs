//! IRQ endpoint mask algebra and client edge propagation.

use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use rvmach_core::Error;
use rvmach_core::irq::{IrqEndpoint, IrqSink};

/// Records every edge delivered to it.
#[derive(Default)]
struct EdgeLog {
    edges: Mutex<Vec<(u32, bool)>>,
}

impl IrqSink for EdgeLog {
    fn irq_assert(&self, num: u32, high: bool) -> rvmach_core::Result<()> {
        self.edges.lock().unwrap().push((num, high));
        Ok(())
    }
}

#[test]
fn assert_latches_into_retained() {
    let ep = IrqEndpoint::new();
    ep.assert_line(3, true).unwrap();
    assert_eq!(ep.level(), 1 << 3);
    assert_eq!(ep.asserted(), 1 << 3);

    ep.assert_line(3, false).unwrap();
    assert_eq!(ep.level(), 0);
    assert_eq!(ep.asserted(), 1 << 3, "retained is sticky");
}

#[test]
fn active_is_retained_and_enabled() {
    let ep = IrqEndpoint::new();
    ep.assert_line(1, true).unwrap();
    ep.assert_line(4, true).unwrap();
    assert_eq!(ep.active(), 0, "all lines masked by default");

    ep.set_enabled(1 << 4).unwrap();
    assert_eq!(ep.active(), 1 << 4);
    assert_eq!(ep.active(), ep.asserted() & ep.enabled());
}

#[test]
fn clear_cannot_remove_still_asserted_lines() {
    let ep = IrqEndpoint::new();
    ep.assert_line(0, true).unwrap();
    ep.assert_line(1, true).unwrap();
    ep.assert_line(1, false).unwrap();

    ep.clear(0b11).unwrap();
    assert_eq!(ep.asserted(), 0b01, "line 0 is still high");
}

#[test]
fn line_number_is_bounded() {
    let ep = IrqEndpoint::new();
    assert_eq!(ep.assert_line(32, true), Err(Error::Arg));
}

#[test]
fn client_sees_rising_and_falling_edges() {
    let log = Arc::new(EdgeLog::default());
    let ep = IrqEndpoint::new_enabled();
    let sink = Arc::clone(&log) as Arc<dyn IrqSink>;
    ep.set_client(&sink, 7).unwrap();

    ep.assert_line(2, true).unwrap();
    ep.assert_line(5, true).unwrap();
    ep.assert_line(2, false).unwrap();
    ep.assert_line(5, false).unwrap();
    ep.clear(u32::MAX).unwrap();

    let edges = log.edges.lock().unwrap();
    // One rising edge when active went non-zero, one falling when it
    // cleared; intermediate changes with active still non-zero are silent.
    assert_eq!(*edges, vec![(7, true), (7, false)]);
}

#[test]
fn unmasking_pending_line_raises_edge() {
    let log = Arc::new(EdgeLog::default());
    let ep = IrqEndpoint::new();
    let sink = Arc::clone(&log) as Arc<dyn IrqSink>;
    ep.set_client(&sink, 0).unwrap();

    ep.assert_line(9, true).unwrap();
    assert!(log.edges.lock().unwrap().is_empty());

    ep.set_enabled(1 << 9).unwrap();
    assert_eq!(*log.edges.lock().unwrap(), vec![(0, true)]);
}

proptest! {
    /// `active == retained & enabled` after arbitrary operation sequences.
    #[test]
    fn active_invariant(ops in proptest::collection::vec((0u32..32, any::<bool>(), 0u8..3), 0..64)) {
        let ep = IrqEndpoint::new();
        for (num, high, kind) in ops {
            match kind {
                0 => { ep.assert_line(num, high).unwrap(); }
                1 => { ep.set_enabled(1 << num).unwrap(); }
                _ => { ep.clear(1 << num).unwrap(); }
            }
            prop_assert_eq!(ep.active(), ep.asserted() & ep.enabled());
            // Retained always contains the current level.
            prop_assert_eq!(ep.asserted() & ep.level(), ep.level());
        }
    }
}
