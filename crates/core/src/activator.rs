use crate::clock::{format_tai_string, parse_tai_string, Clock, TimerHandle};
use crate::error::{ConnectionError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One member of an [`Activator`]'s target list — a [`SenderState`]/[`ReceiverState`] or
/// a [`TransportFileManager`].
///
/// [`SenderState`]: crate::transceiver::SenderState
/// [`ReceiverState`]: crate::transceiver::ReceiverState
/// [`TransportFileManager`]: crate::transport_file::TransportFileManager
pub trait Target: Send {
    fn lock(&mut self);
    fn unlock(&mut self);
    fn activate(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    ActivateImmediate,
    ActivateScheduledAbsolute,
    ActivateScheduledRelative,
}

/// `{mode, requested_time, activation_time}`, with `requested_time`/`activation_time`
/// serialized as TAI strings. Absent entirely is represented as `None` at the call site,
/// not as a variant here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub mode: ActivationMode,
    pub requested_time: Option<String>,
    pub activation_time: Option<String>,
}

/// The incoming `activation` object of a PATCH, before it's turned into an
/// [`ActivationRecord`]. `mode: None` means "cancel" (the wire `null`).
#[derive(Debug, Clone, Deserialize)]
pub struct ActivationRequest {
    pub mode: Option<ActivationMode>,
    pub requested_time: Option<String>,
}

/// Status an [`Activator::parse`] call resolves to, mirroring the PATCH pipeline's
/// 200/202 split between immediate and scheduled activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationStatus {
    Immediate,
    Scheduled,
    Cancelled,
}

struct ArmedState {
    timer: TimerHandle,
}

/// Coordinates ordered commits across a target list bound at construction. For a
/// receiver the order is `[TransportFileManager, TransceiverState]` so the SDP-derived
/// values land in the active transport file before the receiver's active parameters are
/// exposed; for a sender it is just `[TransceiverState]`.
///
/// An Activator is either idle or armed; [`Activator::parse`] rejects a new schedule or
/// immediate activation while one is already armed, unless the caller first cancels with
/// `mode: null` (this spec's resolution of the re-arming-while-armed open question).
///
/// Carries two record slots, per the `{scheduled, timer, last, active}` state: `last` is
/// the record of the activation request most recently accepted (pending while armed,
/// reset to `None` once it has moved across), `active` is the record describing whatever
/// is currently live in every target's `active` slot.
pub struct Activator {
    targets: Mutex<Vec<Box<dyn Target>>>,
    armed: Mutex<Option<ArmedState>>,
    last: Mutex<Option<ActivationRecord>>,
    active: Mutex<Option<ActivationRecord>>,
    clock: Arc<dyn Clock>,
}

impl Activator {
    pub fn new(targets: Vec<Box<dyn Target>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            targets: Mutex::new(targets),
            armed: Mutex::new(None),
            last: Mutex::new(None),
            active: Mutex::new(None),
            clock,
        }
    }

    pub fn last(&self) -> Option<ActivationRecord> {
        self.last.lock().clone()
    }

    pub fn active(&self) -> Option<ActivationRecord> {
        self.active.lock().clone()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.lock().is_some()
    }

    /// Runs `activate()` on each target in list order. No rollback is attempted across
    /// targets here if one fails partway — each target's own `activate()` already rolled
    /// its own `active` back; the engine just surfaces the error.
    fn activate_all(&self) -> Result<()> {
        let mut targets = self.targets.lock();
        for target in targets.iter_mut() {
            target.activate()?;
        }
        Ok(())
    }

    fn unlock_all(&self) {
        for target in self.targets.lock().iter_mut() {
            target.unlock();
        }
    }

    fn lock_all(&self) {
        for target in self.targets.lock().iter_mut() {
            target.lock();
        }
    }

    pub fn parse(self: &Arc<Self>, request: ActivationRequest) -> Result<(ActivationStatus, Option<ActivationRecord>)> {
        match request.mode {
            None => {
                let mut armed = self.armed.lock();
                if let Some(state) = armed.take() {
                    self.clock.cancel(state.timer);
                }
                drop(armed);
                self.unlock_all();
                *self.last.lock() = None;
                Ok((ActivationStatus::Cancelled, None))
            }
            Some(ActivationMode::ActivateImmediate) => {
                if self.is_armed() {
                    return Err(ConnectionError::conflict(
                        "an activation is already armed; cancel it with mode=null first",
                    ));
                }

                self.activate_all()?;
                let now = self.clock.now_tai();
                let record = ActivationRecord {
                    mode: ActivationMode::ActivateImmediate,
                    requested_time: None,
                    activation_time: Some(format_tai_string(now)),
                };
                // No waiting window for an immediate activation: the record moves
                // straight into `active` and `last` is reset, per the `last -> active`
                // transition the scheduled path performs on timer fire.
                *self.active.lock() = Some(record.clone());
                *self.last.lock() = None;
                Ok((ActivationStatus::Immediate, Some(record)))
            }
            Some(ActivationMode::ActivateScheduledAbsolute) => {
                if self.is_armed() {
                    return Err(ConnectionError::conflict(
                        "an activation is already armed; cancel it with mode=null first",
                    ));
                }
                let requested = request.requested_time.clone().ok_or_else(|| {
                    ConnectionError::validation("requested_time is required for a scheduled activation")
                })?;
                let target = parse_tai_string(&requested)?;
                let now = self.clock.now_tai();
                let offset = self.clock.offset(now, target);

                let activation_time = {
                    let mut t = now;
                    t.0 += offset.as_secs() as i64;
                    t.1 += offset.subsec_nanos();
                    t
                };

                let record = ActivationRecord {
                    mode: ActivationMode::ActivateScheduledAbsolute,
                    requested_time: Some(requested),
                    activation_time: Some(format_tai_string(activation_time)),
                };
                self.arm(offset, record.clone());
                Ok((ActivationStatus::Scheduled, Some(record)))
            }
            Some(ActivationMode::ActivateScheduledRelative) => {
                if self.is_armed() {
                    return Err(ConnectionError::conflict(
                        "an activation is already armed; cancel it with mode=null first",
                    ));
                }
                let requested = request.requested_time.clone().ok_or_else(|| {
                    ConnectionError::validation("requested_time is required for a scheduled activation")
                })?;
                let (secs, nanos) = parse_tai_string(&requested)?;
                let duration = Duration::new(secs.max(0) as u64, nanos);

                let now = self.clock.now_tai();
                let activation_time = {
                    let mut t = now;
                    t.0 += duration.as_secs() as i64;
                    t.1 += duration.subsec_nanos();
                    t
                };

                let record = ActivationRecord {
                    mode: ActivationMode::ActivateScheduledRelative,
                    requested_time: Some(requested),
                    activation_time: Some(format_tai_string(activation_time)),
                };
                self.arm(duration, record.clone());
                Ok((ActivationStatus::Scheduled, Some(record)))
            }
        }
    }

    fn arm(self: &Arc<Self>, duration: Duration, record: ActivationRecord) {
        self.lock_all();
        *self.last.lock() = Some(record);

        let this = self.clone();
        let timer = self.clock.after(
            duration,
            Box::new(move || {
                if let Err(e) = this.activate_all() {
                    log::warn!("scheduled activation failed: {e}");
                }
                this.unlock_all();
                let record = this.last.lock().take();
                *this.active.lock() = record;
                *this.armed.lock() = None;
            }),
        );

        *self.armed.lock() = Some(ArmedState { timer });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::FakeClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTarget(Arc<AtomicUsize>);

    impl Target for CountingTarget {
        fn lock(&mut self) {}
        fn unlock(&mut self) {}
        fn activate(&mut self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn immediate_activation_runs_targets_synchronously() {
        let count = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(FakeClock::new((0, 0)));
        let activator = Arc::new(Activator::new(
            vec![Box::new(CountingTarget(count.clone()))],
            clock,
        ));

        let (status, record) = activator
            .parse(ActivationRequest {
                mode: Some(ActivationMode::ActivateImmediate),
                requested_time: None,
            })
            .unwrap();

        assert_eq!(status, ActivationStatus::Immediate);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(record.unwrap().mode, ActivationMode::ActivateImmediate);
    }

    #[test]
    fn scheduled_relative_fires_on_fake_clock_advance() {
        let count = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(FakeClock::new((0, 0)));
        let activator = Arc::new(Activator::new(
            vec![Box::new(CountingTarget(count.clone()))],
            clock.clone(),
        ));

        let (status, _) = activator
            .parse(ActivationRequest {
                mode: Some(ActivationMode::ActivateScheduledRelative),
                requested_time: Some("1:0".to_owned()),
            })
            .unwrap();
        assert_eq!(status, ActivationStatus::Scheduled);
        assert!(activator.is_armed());

        clock.advance(Duration::from_millis(900));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_millis(200));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!activator.is_armed());
    }

    #[test]
    fn rearming_while_armed_is_rejected() {
        let count = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(FakeClock::new((0, 0)));
        let activator = Arc::new(Activator::new(
            vec![Box::new(CountingTarget(count))],
            clock,
        ));

        activator
            .parse(ActivationRequest {
                mode: Some(ActivationMode::ActivateScheduledRelative),
                requested_time: Some("10:0".to_owned()),
            })
            .unwrap();

        let err = activator
            .parse(ActivationRequest {
                mode: Some(ActivationMode::ActivateImmediate),
                requested_time: None,
            })
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Conflict);
    }

    #[test]
    fn null_mode_cancels_and_unlocks() {
        let count = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(FakeClock::new((0, 0)));
        let activator = Arc::new(Activator::new(
            vec![Box::new(CountingTarget(count.clone()))],
            clock.clone(),
        ));

        activator
            .parse(ActivationRequest {
                mode: Some(ActivationMode::ActivateScheduledRelative),
                requested_time: Some("10:0".to_owned()),
            })
            .unwrap();

        let (status, _) = activator
            .parse(ActivationRequest {
                mode: None,
                requested_time: None,
            })
            .unwrap();
        assert_eq!(status, ActivationStatus::Cancelled);
        assert!(!activator.is_armed());

        clock.advance(Duration::from_secs(20));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
