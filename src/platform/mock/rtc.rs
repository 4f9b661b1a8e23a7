//! Mock RTC implementation for testing

use crate::platform::{
    error::RtcError,
    traits::{DateTime, RtcInterface},
    Result,
};

/// Mock RTC holding a settable calendar value.
///
/// The clock does not tick; tests read back exactly what was set.
#[derive(Debug)]
pub struct MockRtc {
    now: DateTime,
}

impl MockRtc {
    /// Create a new mock RTC at the firmware build epoch
    pub fn new() -> Self {
        Self {
            now: DateTime {
                year: 2025,
                month: 1,
                day: 1,
                hours: 0,
                minutes: 0,
                seconds: 0,
            },
        }
    }
}

impl Default for MockRtc {
    fn default() -> Self {
        Self::new()
    }
}

impl RtcInterface for MockRtc {
    fn datetime(&self) -> Result<DateTime> {
        Ok(self.now)
    }

    fn set_datetime(&mut self, dt: &DateTime) -> Result<()> {
        if !dt.is_valid() {
            return Err(RtcError::InvalidDateTime.into());
        }
        self.now = *dt;
        Ok(())
    }
}
