//! An injectable clock, so bind-state timeouts and frame-ingress timestamps
//! can be driven deterministically in tests.

use chrono::{DateTime, Utc};

/// A source of the current time.
///
/// Production code uses [`SystemClock`]; tests can substitute a fixed or
/// steppable clock to make timeout-dependent behaviour (the bind state
/// machine's `CONFIRM_TIMEOUT_SECS`/`WAITING_TIMEOUT_SECS` edges, and the
/// frame codec's ingress timestamp) reproducible.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// A [`Clock`] backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use std::sync::Mutex;

    /// A [`Clock`] that only advances when told to.
    #[derive(Debug, Default)]
    pub struct FixedClock(Mutex<DateTime<Utc>>);

    impl FixedClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            FixedClock(Mutex::new(start))
        }

        pub fn advance(&self, duration: chrono::Duration) {
            let mut guard = self.0.lock().unwrap();
            *guard += duration;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }
}
