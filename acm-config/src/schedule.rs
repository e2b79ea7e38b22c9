//! Periodic schedule entries attached to a stream.

use crate::error::{AcmError, AcmResult};

/// One periodic event or reception window. `tag` is an internal, per-stream
/// monotonically increasing id used to match generated FSC commands back to
/// the schedule entry that produced them (see [`crate::compiler::fsc`]);
/// it has no counterpart in the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEntry {
    Event { tag: u32, period_ns: u64, send_time_ns: u64 },
    Window { tag: u32, period_ns: u64, time_start_ns: u64, time_end_ns: u64 },
}

impl ScheduleEntry {
    pub fn period_ns(&self) -> u64 {
        match self {
            ScheduleEntry::Event { period_ns, .. } => *period_ns,
            ScheduleEntry::Window { period_ns, .. } => *period_ns,
        }
    }

    pub fn tag(&self) -> u32 {
        match self {
            ScheduleEntry::Event { tag, .. } => *tag,
            ScheduleEntry::Window { tag, .. } => *tag,
        }
    }

    pub(crate) fn new_event(tag: u32, period_ns: u64, send_time_ns: u64) -> AcmResult<Self> {
        if period_ns == 0 || send_time_ns > period_ns {
            return Err(AcmError::ScheduleCreation);
        }
        Ok(ScheduleEntry::Event { tag, period_ns, send_time_ns })
    }

    pub(crate) fn new_window(tag: u32, period_ns: u64, time_start_ns: u64, time_end_ns: u64) -> AcmResult<Self> {
        if period_ns == 0 || time_start_ns > period_ns || time_end_ns > period_ns {
            return Err(AcmError::ScheduleCreation);
        }
        Ok(ScheduleEntry::Window { tag, period_ns, time_start_ns, time_end_ns })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_send_time_cannot_exceed_period() {
        assert!(ScheduleEntry::new_event(0, 1000, 1001).is_err());
        assert!(ScheduleEntry::new_event(0, 1000, 1000).is_ok());
    }

    #[test]
    fn window_may_wrap_start_after_end() {
        // start > end is explicitly permitted; it means the window wraps.
        assert!(ScheduleEntry::new_window(0, 1000, 900, 100).is_ok());
    }
}
