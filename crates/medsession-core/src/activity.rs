//! Activity Monitor
//!
//! Converts high-frequency interaction signals into two low-frequency
//! outputs: a throttled `Active` report and a one-shot `Idle` report.
//!
//! ## Design
//!
//! - Pure: the monitor never reads a clock or arms a timer. Callers pass
//!   `now` in and read [`ActivityMonitor::idle_deadline`] to know when to
//!   call [`ActivityMonitor::poll_idle`].
//! - Network traffic counts as activity. It arrives through the request
//!   gateway as [`ActivitySignal::Network`] rather than by patching any
//!   transport globally.

use std::{ops::Add, time::Duration};

use thiserror::Error;

use crate::env::elapsed;

/// Category of an observed interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivitySignal {
    /// Mouse, touch or pen input.
    Pointer,
    /// Key press.
    Keyboard,
    /// Scrolling.
    Scroll,
    /// Focus moved between elements or windows.
    Focus,
    /// Form field input or change.
    FormInput,
    /// Form submission.
    FormSubmit,
    /// An outbound API call passed through the gateway.
    Network,
}

/// Output of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    /// User is active (throttled by the cooldown).
    Active,
    /// No signal for the whole idle timeout.
    Idle,
}

/// Monitor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityConfig {
    /// Silence after which `Idle` is reported.
    pub idle_timeout: Duration,
    /// Minimum spacing between two `Active` reports while not idle.
    pub notify_cooldown: Duration,
    /// A disabled monitor swallows every signal and never reports.
    pub enabled: bool,
}

/// Errors from [`ActivityMonitor::start`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    /// The idle timeout must be positive.
    #[error("idle timeout must be greater than zero")]
    InvalidIdleTimeout,
}

/// Snapshot of the monitor's view of the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityState<I> {
    /// Last observed signal (or start time when none was observed yet).
    pub last_activity_at: Option<I>,
    /// Whether `Idle` has been reported since the last signal.
    pub is_idle: bool,
}

/// Debounces interaction signals into `Active`/`Idle` reports.
#[derive(Debug, Clone)]
pub struct ActivityMonitor<I> {
    config: Option<ActivityConfig>,
    last_activity_at: Option<I>,
    last_active_report: Option<I>,
    idle_deadline: Option<I>,
    is_idle: bool,
}

impl<I> Default for ActivityMonitor<I> {
    fn default() -> Self {
        Self {
            config: None,
            last_activity_at: None,
            last_active_report: None,
            idle_deadline: None,
            is_idle: false,
        }
    }
}

impl<I> ActivityMonitor<I>
where
    I: Copy + Ord + Add<Duration, Output = I> + std::ops::Sub<I, Output = Duration>,
{
    /// Create a stopped monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin observing.
    ///
    /// Restarting a running monitor resets its state. The idle deadline is
    /// armed immediately, so a user who never interacts still goes idle.
    ///
    /// # Errors
    ///
    /// Returns `ActivityError::InvalidIdleTimeout` for a zero timeout; the
    /// monitor is left stopped.
    pub fn start(&mut self, config: ActivityConfig, now: I) -> Result<(), ActivityError> {
        if config.idle_timeout.is_zero() {
            self.stop();
            return Err(ActivityError::InvalidIdleTimeout);
        }

        self.config = Some(config);
        self.last_activity_at = Some(now);
        self.last_active_report = None;
        self.is_idle = false;
        self.idle_deadline = config.enabled.then(|| now + config.idle_timeout);

        Ok(())
    }

    /// Deregister everything. Safe to call from any state, any number of
    /// times.
    pub fn stop(&mut self) {
        *self = Self::default();
    }

    /// Whether the monitor has been started and not stopped.
    pub fn is_running(&self) -> bool {
        self.config.is_some()
    }

    /// Observe one interaction.
    ///
    /// Re-arms the idle deadline. Returns `Active` when the user was idle or
    /// the cooldown since the previous `Active` report has elapsed.
    pub fn record(&mut self, _signal: ActivitySignal, now: I) -> Option<ActivityEvent> {
        let config = self.config.filter(|c| c.enabled)?;

        self.last_activity_at = Some(now);
        self.idle_deadline = Some(now + config.idle_timeout);

        let was_idle = std::mem::replace(&mut self.is_idle, false);
        let cooled_down = self
            .last_active_report
            .is_none_or(|last| elapsed(now, last) >= config.notify_cooldown);

        if was_idle || cooled_down {
            self.last_active_report = Some(now);
            Some(ActivityEvent::Active)
        } else {
            None
        }
    }

    /// Report `Idle` once the deadline has passed.
    ///
    /// Returns `None` on every later poll until a new signal re-arms the
    /// deadline.
    pub fn poll_idle(&mut self, now: I) -> Option<ActivityEvent> {
        let deadline = self.idle_deadline?;
        if self.is_idle || now < deadline {
            return None;
        }

        self.is_idle = true;
        self.idle_deadline = None;
        Some(ActivityEvent::Idle)
    }

    /// When the driver should next call [`poll_idle`](Self::poll_idle).
    pub fn idle_deadline(&self) -> Option<I> {
        self.idle_deadline
    }

    /// Current view of the user.
    pub fn state(&self) -> ActivityState<I> {
        ActivityState { last_activity_at: self.last_activity_at, is_idle: self.is_idle }
    }
}
