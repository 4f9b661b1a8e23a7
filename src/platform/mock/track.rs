//! Mock track output stage for testing
//!
//! Records every drive transition so waveform tests can assert on phase
//! alternation, cutout placement and the scope trigger.

use crate::platform::traits::TrackOutputs;
use alloc::vec::Vec;

/// One recorded output event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEvent {
    /// Bridge legs driven (n, p)
    Drive(bool, bool),
    /// Cutout entered
    CutoutStart,
    /// Cutout left
    CutoutEnd,
    /// Scope trigger level changed
    Scope(bool),
}

/// Recording mock of the track driver stage
#[derive(Debug, Default)]
pub struct MockTrackOutputs {
    events: Vec<TrackEvent>,
    in_cutout: bool,
}

impl MockTrackOutputs {
    /// Create a new recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events in order
    pub fn events(&self) -> &[TrackEvent] {
        &self.events
    }

    /// Number of cutouts entered so far
    pub fn cutout_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, TrackEvent::CutoutStart))
            .count()
    }

    /// True while between cutout_start and cutout_end
    pub fn in_cutout(&self) -> bool {
        self.in_cutout
    }

    /// Last drive event, if any
    pub fn last_drive(&self) -> Option<(bool, bool)> {
        self.events.iter().rev().find_map(|e| match e {
            TrackEvent::Drive(n, p) => Some((*n, *p)),
            _ => None,
        })
    }

    /// Forget recorded events (state flags are kept)
    pub fn clear_events(&mut self) {
        self.events.clear();
    }
}

impl TrackOutputs for MockTrackOutputs {
    fn drive(&mut self, n: bool, p: bool) {
        self.events.push(TrackEvent::Drive(n, p));
    }

    fn cutout_start(&mut self) {
        self.in_cutout = true;
        self.events.push(TrackEvent::CutoutStart);
    }

    fn cutout_end(&mut self) {
        self.in_cutout = false;
        self.events.push(TrackEvent::CutoutEnd);
    }

    fn scope_trigger(&mut self, high: bool) {
        self.events.push(TrackEvent::Scope(high));
    }
}
