use chrono::{DateTime, Local};

/// Source of reading timestamps.
pub trait Clock {
    fn now(&self) -> DateTime<Local>;
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
