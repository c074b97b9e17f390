use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::clock::{CancelToken, Clock};
use super::config::Config;
use super::ui_event::{UiEvent, UiSender};

/// Timing windows of the renewal watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogSettings {
    /// Idle time without a renewal push before warning the user
    pub timeout: Duration,
    /// How long the warning stays up before forcing shutdown
    pub prompt: Duration,
    pub tick: Duration,
}

impl WatchdogSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: minutes_to_duration(config.watchdog_timeout_minutes),
            prompt: minutes_to_duration(config.watchdog_prompt_minutes),
            tick: Duration::from_millis(config.watchdog_tick_millis),
        }
    }
}

fn minutes_to_duration(minutes: f64) -> Duration {
    Duration::from_millis((minutes * 60_000.0).round().max(0.0) as u64)
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_millis().div_ceil(1000) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Alive,
    Warning { deadline: Instant },
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    None,
    EnterWarning { seconds_remaining: u64 },
    WarningCountdown { seconds_remaining: u64 },
    Shutdown,
}

/// Lease renewal watchdog state machine.
///
/// Idle time is measured from the later of the last renewal push and the last time the
/// user cancelled a warning. A renewal arriving during a warning does not close it.
#[derive(Debug, Clone)]
pub struct RenewalWatchdog {
    settings: WatchdogSettings,
    last_renewal: Instant,
    last_cancel: Option<Instant>,
    state: WatchdogState,
}

impl RenewalWatchdog {
    pub fn new(settings: WatchdogSettings, now: Instant) -> Self {
        Self {
            settings,
            last_renewal: now,
            last_cancel: None,
            state: WatchdogState::Alive,
        }
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    pub fn settings(&self) -> &WatchdogSettings {
        &self.settings
    }

    pub fn renewal_received(&mut self, now: Instant) {
        self.last_renewal = now;
    }

    /// User dismissed the warning. Returns false if no warning was showing.
    pub fn cancel_warning(&mut self, now: Instant) -> bool {
        match self.state {
            WatchdogState::Warning { .. } => {
                self.last_cancel = Some(now);
                self.state = WatchdogState::Alive;
                true
            }
            _ => false,
        }
    }

    pub fn idle_time(&self, now: Instant) -> Duration {
        let reference = match self.last_cancel {
            Some(cancel) => cancel.max(self.last_renewal),
            None => self.last_renewal,
        };
        now.saturating_duration_since(reference)
    }

    pub fn tick(&mut self, now: Instant) -> WatchdogAction {
        match self.state {
            WatchdogState::Alive => {
                if self.idle_time(now) >= self.settings.timeout {
                    self.state = WatchdogState::Warning {
                        deadline: now + self.settings.prompt,
                    };
                    WatchdogAction::EnterWarning {
                        seconds_remaining: ceil_secs(self.settings.prompt),
                    }
                } else {
                    WatchdogAction::None
                }
            }
            WatchdogState::Warning { deadline } => {
                if now >= deadline {
                    self.state = WatchdogState::ShuttingDown;
                    WatchdogAction::Shutdown
                } else {
                    WatchdogAction::WarningCountdown {
                        seconds_remaining: ceil_secs(deadline - now),
                    }
                }
            }
            WatchdogState::ShuttingDown => WatchdogAction::None,
        }
    }
}

/// Shared owner of a [`RenewalWatchdog`] and its polling loop
#[derive(Clone)]
pub struct Watchdog {
    machine: Arc<Mutex<RenewalWatchdog>>,
    clock: Arc<dyn Clock>,
    stop: CancelToken,
}

impl Watchdog {
    pub fn new(settings: WatchdogSettings, clock: Arc<dyn Clock>) -> Self {
        let machine = RenewalWatchdog::new(settings, clock.now());
        Self {
            machine: Arc::new(Mutex::new(machine)),
            clock,
            stop: CancelToken::new(),
        }
    }

    fn machine(&self) -> std::sync::MutexGuard<'_, RenewalWatchdog> {
        self.machine.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> WatchdogState {
        self.machine().state()
    }

    pub fn renewal_received(&self) {
        let now = self.clock.now();
        self.machine().renewal_received(now);
    }

    /// Returns true if a warning was showing and is now cancelled
    pub fn cancel_warning(&self, ui: &UiSender) -> bool {
        let now = self.clock.now();
        let cancelled = self.machine().cancel_warning(now);
        if cancelled {
            spdlog::info!("Shutdown warning cancelled by user");
            ui.post(UiEvent::ShutdownWarningCancelled);
        }
        cancelled
    }

    /// Ask the polling loop to exit at its next tick
    pub fn stop(&self) {
        self.stop.cancel()
    }

    /// Blocking polling loop. Calls `on_shutdown` once and returns when the warning
    /// window elapses; returns without calling it when stopped.
    pub fn run(&self, ui: &UiSender, on_shutdown: impl FnOnce()) {
        let tick = self.machine().settings().tick;
        let mut last_posted: Option<u64> = None;
        loop {
            if self.stop.is_cancelled() {
                spdlog::debug!("Renewal watchdog stopped");
                return;
            }
            self.clock.sleep(tick);
            let now = self.clock.now();
            let action = self.machine().tick(now);
            match action {
                WatchdogAction::None => last_posted = None,
                WatchdogAction::EnterWarning { seconds_remaining } => {
                    spdlog::warn!(
                        "No baton lease renewal received; shutting down in {seconds_remaining}s unless cancelled"
                    );
                    ui.post(UiEvent::ShutdownWarning { seconds_remaining });
                    last_posted = Some(seconds_remaining);
                }
                WatchdogAction::WarningCountdown { seconds_remaining } => {
                    if last_posted != Some(seconds_remaining) {
                        ui.post(UiEvent::ShutdownWarning { seconds_remaining });
                        last_posted = Some(seconds_remaining);
                    }
                }
                WatchdogAction::Shutdown => {
                    spdlog::error!("Shutdown warning expired, shutting down the client");
                    on_shutdown();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(timeout_ms: u64, prompt_ms: u64) -> WatchdogSettings {
        WatchdogSettings {
            timeout: Duration::from_millis(timeout_ms),
            prompt: Duration::from_millis(prompt_ms),
            tick: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_minutes_conversion() {
        assert_eq!(minutes_to_duration(0.01), Duration::from_millis(600));
        assert_eq!(minutes_to_duration(5.0), Duration::from_secs(300));
    }

    #[test]
    fn test_renewals_keep_it_alive() {
        let start = Instant::now();
        let mut dog = RenewalWatchdog::new(settings(5_000, 1_000), start);
        for second in 1..=60 {
            let now = start + Duration::from_secs(second);
            if second % 4 == 0 {
                dog.renewal_received(now);
            }
            assert_eq!(dog.tick(now), WatchdogAction::None);
        }
        assert_eq!(dog.state(), WatchdogState::Alive);
    }

    #[test]
    fn test_warning_then_shutdown() {
        let start = Instant::now();
        let mut dog = RenewalWatchdog::new(settings(5_000, 2_000), start);
        assert_eq!(
            dog.tick(start + Duration::from_secs(5)),
            WatchdogAction::EnterWarning {
                seconds_remaining: 2
            }
        );
        assert_eq!(
            dog.tick(start + Duration::from_millis(6_500)),
            WatchdogAction::WarningCountdown {
                seconds_remaining: 1
            }
        );
        assert_eq!(
            dog.tick(start + Duration::from_secs(7)),
            WatchdogAction::Shutdown
        );
        assert_eq!(dog.tick(start + Duration::from_secs(8)), WatchdogAction::None);
    }

    #[test]
    fn test_renewal_does_not_close_open_warning() {
        let start = Instant::now();
        let mut dog = RenewalWatchdog::new(settings(5_000, 2_000), start);
        dog.tick(start + Duration::from_secs(5));
        dog.renewal_received(start + Duration::from_secs(6));
        assert_eq!(
            dog.tick(start + Duration::from_secs(7)),
            WatchdogAction::Shutdown
        );
    }

    #[test]
    fn test_rewarn_measured_from_cancel() {
        let start = Instant::now();
        let mut dog = RenewalWatchdog::new(settings(5_000, 2_000), start);
        dog.tick(start + Duration::from_secs(5));
        assert!(dog.cancel_warning(start + Duration::from_secs(6)));
        assert!(!dog.cancel_warning(start + Duration::from_secs(6)));
        // 5s after the first renewal would be t=5; from the cancel it is t=11
        assert_eq!(dog.tick(start + Duration::from_secs(10)), WatchdogAction::None);
        assert!(matches!(
            dog.tick(start + Duration::from_secs(11)),
            WatchdogAction::EnterWarning { .. }
        ));
    }
}
