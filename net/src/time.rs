//! Local time and clocks.
use std::sync::{atomic, Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Local time.
///
/// This clock is monotonic.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Ord, PartialOrd, Default)]
pub struct LocalTime {
    /// Milliseconds since Epoch.
    millis: u128,
}

impl std::fmt::Display for LocalTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_secs())
    }
}

impl LocalTime {
    /// Construct a local time from the current system time, with millisecond
    /// resolution.
    pub fn now() -> Self {
        static LAST: atomic::AtomicU64 = atomic::AtomicU64::new(0);

        let now = Self::from(SystemTime::now()).millis as u64;
        // If the system clock went backwards, stick to the last recorded time.
        let last = LAST.fetch_max(now, atomic::Ordering::SeqCst);

        Self {
            millis: now.max(last) as u128,
        }
    }

    /// Construct a local time from whole seconds since Epoch.
    pub const fn from_secs(secs: u64) -> Self {
        Self {
            millis: secs as u128 * 1000,
        }
    }

    /// Return the local time as whole seconds since Epoch.
    pub fn as_secs(&self) -> u64 {
        (self.millis / 1000) as u64
    }

    /// Elapse time.
    ///
    /// Adds the given duration to the time.
    pub fn elapse(&mut self, duration: LocalDuration) {
        self.millis += duration.as_millis()
    }
}

/// Convert a `SystemTime` into a local time.
impl From<SystemTime> for LocalTime {
    fn from(system: SystemTime) -> Self {
        let millis = system
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        Self { millis }
    }
}

/// Substract two local times. Yields a duration.
impl std::ops::Sub<LocalTime> for LocalTime {
    type Output = LocalDuration;

    fn sub(self, other: LocalTime) -> LocalDuration {
        LocalDuration(self.millis.saturating_sub(other.millis))
    }
}

/// Add a duration to a local time. Yields a local time.
impl std::ops::Add<LocalDuration> for LocalTime {
    type Output = LocalTime;

    fn add(self, other: LocalDuration) -> LocalTime {
        LocalTime {
            millis: self.millis + other.0,
        }
    }
}

/// Time duration as measured locally.
#[derive(Debug, Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Default)]
pub struct LocalDuration(u128);

impl LocalDuration {
    /// Create a new duration from whole seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs as u128 * 1000)
    }

    /// Create a new duration from whole minutes.
    pub const fn from_mins(mins: u64) -> Self {
        Self::from_secs(mins * 60)
    }

    /// Construct a new duration from milliseconds.
    pub const fn from_millis(millis: u128) -> Self {
        Self(millis)
    }

    /// Return the number of seconds in this duration.
    pub const fn as_secs(&self) -> u64 {
        (self.0 / 1000) as u64
    }

    /// Return the number of milliseconds in this duration.
    pub const fn as_millis(&self) -> u128 {
        self.0
    }
}

impl std::fmt::Display for LocalDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.as_millis() < 1000 {
            write!(f, "{} millisecond(s)", self.as_millis())
        } else if self.as_secs() < 60 {
            write!(f, "{} second(s)", self.as_secs())
        } else {
            write!(f, "{} minute(s)", self.as_secs() / 60)
        }
    }
}

impl std::ops::Add<LocalDuration> for LocalDuration {
    type Output = LocalDuration;

    fn add(self, other: LocalDuration) -> LocalDuration {
        LocalDuration(self.0 + other.0)
    }
}

/// Clock that tells the time.
pub trait Clock: Clone {
    /// Tell the time in local time.
    fn local_time(&self) -> LocalTime;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_time(&self) -> LocalTime {
        LocalTime::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    inner: Arc<Mutex<LocalTime>>,
}

impl ManualClock {
    /// Create a clock stopped at the given time.
    pub fn new(time: LocalTime) -> Self {
        Self {
            inner: Arc::new(Mutex::new(time)),
        }
    }

    /// Elapse time.
    pub fn elapse(&self, duration: LocalDuration) {
        match self.inner.lock() {
            Ok(mut time) => time.elapse(duration),
            Err(poisoned) => poisoned.into_inner().elapse(duration),
        }
    }
}

impl Clock for ManualClock {
    fn local_time(&self) -> LocalTime {
        match self.inner.lock() {
            Ok(time) => *time,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new(LocalTime::from_secs(100));
        let other = clock.clone();

        other.elapse(LocalDuration::from_secs(30));

        assert_eq!(clock.local_time(), LocalTime::from_secs(130));
        assert_eq!(
            clock.local_time() - LocalTime::from_secs(100),
            LocalDuration::from_secs(30)
        );
    }

    #[test]
    fn test_now_resolution() {
        let before = LocalTime::now();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let after = LocalTime::now();

        assert!(after - before >= LocalDuration::from_millis(20));
        assert!(after - before < LocalDuration::from_secs(1));
    }

    #[test]
    fn test_sub_saturates() {
        let earlier = LocalTime::from_secs(1);
        let later = LocalTime::from_secs(2);

        assert_eq!(earlier - later, LocalDuration::default());
        assert_eq!(later - earlier, LocalDuration::from_secs(1));
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(LocalDuration::from_millis(15).to_string(), "15 millisecond(s)");
        assert_eq!(LocalDuration::from_secs(3).to_string(), "3 second(s)");
        assert_eq!(LocalDuration::from_mins(5).to_string(), "5 minute(s)");
    }
}
