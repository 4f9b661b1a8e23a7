//! Track driver stage interface
//!
//! The command station drives the rails through an H-bridge with separate N
//! and P legs, a booster enable line (BR_ENABLE), a BiDi cutout gate
//! (BIDIR_EN) and a scope trigger pin. This trait is the seam between the
//! timing engine (which runs in the timer-update interrupt) and the pins; the
//! implementation must be callable from interrupt context without blocking.

/// Track output stage
///
/// # Safety Invariants
///
/// - Owned exclusively by the timing engine; no task-context writer exists
/// - All methods are wait-free
pub trait TrackOutputs {
    /// Drive the two bridge legs. `drive(false, false)` releases the track.
    fn drive(&mut self, n: bool, p: bool);

    /// Enter the BiDi cutout: booster off (BR_ENABLE low), receive path
    /// enabled (BIDIR_EN high).
    fn cutout_start(&mut self);

    /// Leave the BiDi cutout: receive path disabled, booster re-enabled.
    fn cutout_end(&mut self);

    /// Drive the scope trigger pin used to mark the first bit of a packet.
    fn scope_trigger(&mut self, high: bool);
}
