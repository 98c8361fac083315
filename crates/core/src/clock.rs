use crate::error::ConnectionError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A TAI instant, `(seconds, nanoseconds)` since the TAI epoch.
pub type Tai = (i64, u32);

/// A handle to a scheduled one-shot callback. Dropping it does not cancel the timer;
/// use [`Clock::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(u64);

/// Host "now" plus one-shot scheduling, abstracted so tests can run without real delays.
///
/// `now_tai` is documented as a policy choice in the Clock contract: this implementation
/// treats the host wall clock as TAI directly (no leap-second table), which is within the
/// ±1s slack the scheduled-absolute tests are required to tolerate.
pub trait Clock: Send + Sync {
    fn now_tai(&self) -> Tai;

    fn offset(&self, from: Tai, to: Tai) -> Duration {
        let from = from.0 as f64 + from.1 as f64 / 1e9;
        let to = to.0 as f64 + to.1 as f64 / 1e9;
        Duration::from_secs_f64((to - from).max(0.0))
    }

    /// Schedule `f` to run once, after `duration`. Returns a handle that can be passed
    /// to [`Clock::cancel`].
    fn after(
        &self,
        duration: Duration,
        f: Box<dyn FnOnce() + Send + 'static>,
    ) -> TimerHandle;

    fn cancel(&self, handle: TimerHandle);
}

/// Strict `"<int>:<int>"` parsing used for both TAI instants and durations.
///
/// Any other shape fails with a validation error tagged to the `requested_time` field,
/// per the wire contract for activation requests.
pub fn parse_tai_string(s: &str) -> Result<(i64, u32), ConnectionError> {
    let (secs, nanos) = s.split_once(':').ok_or_else(|| {
        ConnectionError::validation(format!(
            "requested_time '{s}' is not of the form 'seconds:nanoseconds'"
        ))
    })?;

    let secs = secs
        .parse::<i64>()
        .map_err(|_| ConnectionError::validation(format!("invalid seconds in '{s}'")))?;
    let nanos = nanos
        .parse::<u32>()
        .map_err(|_| ConnectionError::validation(format!("invalid nanoseconds in '{s}'")))?;

    Ok((secs, nanos))
}

pub fn format_tai_string(tai: Tai) -> String {
    format!("{}:{}", tai.0, tai.1)
}

/// Real-time [`Clock`] backed by the host wall clock and Tokio's timer wheel.
///
/// Scheduling requires a running Tokio runtime; the timer future is detached with
/// [`tokio::spawn`] and races an internal cancellation channel.
pub struct SystemClock {
    next_id: Mutex<u64>,
    cancellations: Mutex<std::collections::HashMap<u64, tokio::sync::oneshot::Sender<()>>>,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(0),
            cancellations: Mutex::new(std::collections::HashMap::new()),
        }
    }
}

impl Clock for SystemClock {
    fn now_tai(&self) -> Tai {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        (now.as_secs() as i64, now.subsec_nanos())
    }

    fn after(&self, duration: Duration, f: Box<dyn FnOnce() + Send + 'static>) -> TimerHandle {
        let id = {
            let mut next_id = self.next_id.lock();
            let id = *next_id;
            *next_id += 1;
            id
        };

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.cancellations.lock().insert(id, tx);

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    f();
                }
                _ = rx => {
                    log::debug!("timer {id} cancelled before firing");
                }
            }
        });

        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(tx) = self.cancellations.lock().remove(&handle.0) {
            let _ = tx.send(());
        }
    }
}

/// Deterministic [`Clock`] for tests: `now_tai` is settable, `after` records pending
/// timers instead of sleeping and fires them only when [`FakeClock::advance`] is called.
#[derive(Clone, Default)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeClockState>>,
}

#[derive(Default)]
struct FakeClockState {
    now: Tai,
    next_id: u64,
    pending: Vec<(u64, Tai, Option<Box<dyn FnOnce() + Send>>)>,
}

impl FakeClock {
    pub fn new(now: Tai) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeClockState {
                now,
                next_id: 0,
                pending: Vec::new(),
            })),
        }
    }

    pub fn set(&self, now: Tai) {
        self.inner.lock().now = now;
    }

    /// Advance the fake clock by `duration`, firing (in due-time order) any timer whose
    /// deadline has passed.
    pub fn advance(&self, duration: Duration) {
        let due: Vec<_> = {
            let mut state = self.inner.lock();
            state.now.0 += duration.as_secs() as i64;
            state.now.1 += duration.subsec_nanos();
            if state.now.1 >= 1_000_000_000 {
                state.now.0 += 1;
                state.now.1 -= 1_000_000_000;
            }
            let now = state.now;

            let mut due = Vec::new();
            state.pending.retain_mut(|(id, deadline, f)| {
                if *deadline <= now {
                    due.push((*id, f.take()));
                    false
                } else {
                    true
                }
            });
            due
        };

        for (_, f) in due {
            if let Some(f) = f {
                f();
            }
        }
    }
}

impl Clock for FakeClock {
    fn now_tai(&self) -> Tai {
        self.inner.lock().now
    }

    fn after(&self, duration: Duration, f: Box<dyn FnOnce() + Send + 'static>) -> TimerHandle {
        let mut state = self.inner.lock();
        let id = state.next_id;
        state.next_id += 1;

        let mut deadline = state.now;
        deadline.0 += duration.as_secs() as i64;
        deadline.1 += duration.subsec_nanos();
        if deadline.1 >= 1_000_000_000 {
            deadline.0 += 1;
            deadline.1 -= 1_000_000_000;
        }

        state.pending.push((id, deadline, Some(f)));
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        self.inner
            .lock()
            .pending
            .retain(|(id, _, _)| *id != handle.0);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_strict_tai() {
        assert_eq!(parse_tai_string("10:500").unwrap(), (10, 500));
        assert!(parse_tai_string("10").is_err());
        assert!(parse_tai_string("ten:500").is_err());
    }

    #[test]
    fn fake_clock_fires_on_advance() {
        let clock = FakeClock::new((0, 0));
        let fired = Arc::new(Mutex::new(false));
        let fired2 = fired.clone();

        clock.after(Duration::from_secs(1), Box::new(move || *fired2.lock() = true));
        clock.advance(Duration::from_millis(500));
        assert!(!*fired.lock());
        clock.advance(Duration::from_millis(600));
        assert!(*fired.lock());
    }

    #[test]
    fn fake_clock_cancel_prevents_fire() {
        let clock = FakeClock::new((0, 0));
        let fired = Arc::new(Mutex::new(false));
        let fired2 = fired.clone();

        let handle =
            clock.after(Duration::from_secs(1), Box::new(move || *fired2.lock() = true));
        clock.cancel(handle);
        clock.advance(Duration::from_secs(2));
        assert!(!*fired.lock());
    }
}
