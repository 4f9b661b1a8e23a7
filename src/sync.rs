//! Synchronized state abstraction and task life-cycle model.
//!
//! The `SharedState` trait abstracts over the synchronization mechanism used
//! to share mutable state between tasks (and, on target, between tasks and
//! interrupt glue): Embassy's critical-section mutex on hardware, a plain
//! `RefCell` in single-threaded host tests.
//!
//! `TaskState` is the explicit life-cycle state machine that replaces the
//! original start-gate-semaphore coroutines: a controller moves
//! `Stopped -> Starting -> Running -> Stopping -> Stopped`, with the start and
//! stop operations acting as edges that the task observes at its next service
//! point.

/// Life-cycle state of a controller task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Task is idle; hardware is torn down.
    Stopped,
    /// Start accepted; the ISR side has not yet picked up the request.
    Starting,
    /// Actively generating or decoding.
    Running,
    /// Stop accepted; waiting for the ISR side to wind down.
    Stopping,
}

impl TaskState {
    /// True while the task counts as running for start/stop idempotence.
    pub fn is_active(self) -> bool {
        matches!(self, TaskState::Starting | TaskState::Running)
    }
}

/// Platform-agnostic synchronized state access.
///
/// Implementations:
/// - `EmbassyState<T>` for embedded targets using Embassy's critical-section
///   mutex (feature `embassy`)
/// - `MockState<T>` for host testing using `RefCell` (single-threaded)
pub trait SharedState<T> {
    /// Access state immutably.
    fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R;

    /// Access state mutably.
    fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R;
}

#[cfg(feature = "embassy")]
use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

/// Embassy-based synchronized state using a critical-section mutex.
///
/// The critical section ensures atomic access even in interrupt contexts,
/// making this safe for use in async tasks and interrupt glue.
#[cfg(feature = "embassy")]
pub struct EmbassyState<T> {
    inner: Mutex<CriticalSectionRawMutex, core::cell::RefCell<T>>,
}

#[cfg(feature = "embassy")]
impl<T> EmbassyState<T> {
    /// Creates a new `EmbassyState` wrapping the given value.
    ///
    /// This is a const fn, allowing static initialization.
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(core::cell::RefCell::new(value)),
        }
    }
}

#[cfg(feature = "embassy")]
impl<T> SharedState<T> for EmbassyState<T> {
    fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.inner.lock(|cell| f(&cell.borrow()))
    }

    fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

/// Mock synchronized state using `RefCell` for single-threaded testing.
///
/// # Panics
///
/// Panics if borrowing rules are violated (e.g. calling `with_mut` while
/// `with` is active). This indicates a bug in the test code.
pub struct MockState<T> {
    inner: core::cell::RefCell<T>,
}

impl<T> MockState<T> {
    /// Creates a new `MockState` wrapping the given value.
    pub fn new(value: T) -> Self {
        Self {
            inner: core::cell::RefCell::new(value),
        }
    }
}

impl<T> SharedState<T> for MockState<T> {
    fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&self.inner.borrow())
    }

    fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        f(&mut self.inner.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_state_read_modify_read() {
        let state = MockState::new(0u32);
        assert_eq!(state.with(|v| *v), 0);
        state.with_mut(|v| *v += 10);
        assert_eq!(state.with(|v| *v), 10);
    }

    #[test]
    fn mock_state_closure_return_value() {
        let state = MockState::new([1u32, 2, 3]);
        let sum: u32 = state.with(|v| v.iter().sum());
        assert_eq!(sum, 6);
    }

    #[test]
    fn task_state_activity() {
        assert!(!TaskState::Stopped.is_active());
        assert!(TaskState::Starting.is_active());
        assert!(TaskState::Running.is_active());
        assert!(!TaskState::Stopping.is_active());
    }
}
