use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::client_details::ClientDetails;
use super::clock::Clock;
use super::error::FacadeError;
use super::facade::ControlFacade;
use super::ui_event::{UiEvent, UiSender};

/// Message broadcast when the holder keeps the baton
pub const DENIED_MESSAGE: &str = "Baton request denied.";

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// A request from another client for the baton we hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub requester: ClientDetails,
    pub timeout_seconds: u64,
    pub auto_accept_on_timeout: bool,
}

/// How a request popup was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupOutcome {
    /// Holder chose to release
    Released,
    /// Holder chose to keep
    Kept,
    TimedOut { accepted: bool },
    /// We stopped being the holder while the popup was open
    HolderLost,
}

impl PopupOutcome {
    /// Whether the requester gets the baton.
    ///
    /// `HolderLost` counts as a yes regardless of the auto-accept setting.
    pub fn is_affirmative(&self) -> bool {
        match self {
            Self::Released | Self::HolderLost => true,
            Self::Kept => false,
            Self::TimedOut { accepted } => *accepted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupState {
    Waiting { seconds_remaining: u64 },
    Resolved(PopupOutcome),
}

/// The request-response state machine.
///
/// `Waiting` is left exactly once; every later transition attempt returns None.
#[derive(Debug, Clone)]
pub struct RequestPopup {
    request: PendingRequest,
    state: PopupState,
}

impl RequestPopup {
    pub fn new(request: PendingRequest) -> Self {
        let seconds_remaining = request.timeout_seconds;
        Self {
            request,
            state: PopupState::Waiting { seconds_remaining },
        }
    }

    pub fn request(&self) -> &PendingRequest {
        &self.request
    }

    pub fn state(&self) -> PopupState {
        self.state
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, PopupState::Resolved(_))
    }

    /// The holder clicked release (true) or keep (false)
    pub fn answer(&mut self, release: bool) -> Option<PopupOutcome> {
        self.resolve(if release {
            PopupOutcome::Released
        } else {
            PopupOutcome::Kept
        })
    }

    pub fn holder_lost(&mut self) -> Option<PopupOutcome> {
        self.resolve(PopupOutcome::HolderLost)
    }

    /// One second has passed
    pub fn tick(&mut self) -> Option<PopupOutcome> {
        match self.state {
            PopupState::Waiting { seconds_remaining } => {
                let seconds_remaining = seconds_remaining.saturating_sub(1);
                if seconds_remaining == 0 {
                    self.resolve(PopupOutcome::TimedOut {
                        accepted: self.request.auto_accept_on_timeout,
                    })
                } else {
                    self.state = PopupState::Waiting { seconds_remaining };
                    None
                }
            }
            PopupState::Resolved(_) => None,
        }
    }

    fn resolve(&mut self, outcome: PopupOutcome) -> Option<PopupOutcome> {
        match self.state {
            PopupState::Waiting { .. } => {
                self.state = PopupState::Resolved(outcome);
                Some(outcome)
            }
            PopupState::Resolved(_) => None,
        }
    }
}

/// Allows at most one open request popup per client
#[derive(Debug, Clone, Default)]
pub struct RequestGuard {
    busy: Arc<AtomicBool>,
}

impl RequestGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the caller now owns the slot
    pub fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn release(&self) {
        self.busy.store(false, Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

struct PopupShared {
    popup: Mutex<RequestPopup>,
    facade: Arc<dyn ControlFacade>,
    ui: UiSender,
    guard: RequestGuard,
}

impl PopupShared {
    fn transition(
        &self,
        step: impl FnOnce(&mut RequestPopup) -> Option<PopupOutcome>,
    ) -> Option<PopupOutcome> {
        // The lock is dropped before any facade call
        let outcome = {
            let mut popup = self.popup.lock().unwrap_or_else(|e| e.into_inner());
            step(&mut popup)
        };
        if let Some(outcome) = outcome {
            self.complete(outcome);
        }
        outcome
    }

    fn complete(&self, outcome: PopupOutcome) {
        let requester = self.requester();
        spdlog::info!(
            "Baton request from {} resolved: {:?}",
            requester.describe(),
            outcome
        );
        let result = if outcome.is_affirmative() {
            self.facade.assign_baton(requester.index)
        } else {
            self.facade.send_message(DENIED_MESSAGE)
        };
        match result {
            Ok(()) => (),
            // The baton already moved on without us
            Err(FacadeError::NotHolder(_)) if outcome == PopupOutcome::HolderLost => {
                spdlog::debug!("Baton already passed on, nothing to assign")
            }
            Err(e) => {
                spdlog::error!("Failed to answer baton request: {e}");
                self.ui
                    .notice(format!("Failed to answer baton request: {e}"));
            }
        }
        self.ui.post(UiEvent::RequestResolved { requester, outcome });
        self.guard.release();
    }

    fn requester(&self) -> ClientDetails {
        self.popup
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .request()
            .requester
            .clone()
    }

    fn state(&self) -> PopupState {
        self.popup.lock().unwrap_or_else(|e| e.into_inner()).state()
    }
}

/// Shared handle on an open request popup.
///
/// The countdown runs on its own thread via [`PopupHandle::run_countdown`]; the UI
/// answers through [`PopupHandle::answer`]. Whichever reaches the state machine first
/// decides, and the facade is called exactly once.
#[derive(Clone)]
pub struct PopupHandle {
    shared: Arc<PopupShared>,
}

impl PopupHandle {
    /// `guard` must already be held by the caller; it is released on resolution
    pub fn new(
        request: PendingRequest,
        facade: Arc<dyn ControlFacade>,
        ui: UiSender,
        guard: RequestGuard,
    ) -> Self {
        Self {
            shared: Arc::new(PopupShared {
                popup: Mutex::new(RequestPopup::new(request)),
                facade,
                ui,
                guard,
            }),
        }
    }

    pub fn answer(&self, release: bool) -> Option<PopupOutcome> {
        self.shared.transition(|p| p.answer(release))
    }

    pub fn requester(&self) -> ClientDetails {
        self.shared.requester()
    }

    pub fn state(&self) -> PopupState {
        self.shared.state()
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state(), PopupState::Resolved(_))
    }

    /// We are no longer the holder. Resolves the popup as a release if still open.
    pub fn holder_lost(&self) -> Option<PopupOutcome> {
        self.shared.transition(|p| p.holder_lost())
    }

    /// Ask the server whether we still hold the baton and resolve if not.
    /// Returns true once the popup is resolved.
    fn check_holder(&self) -> bool {
        let still_holder = match self.shared.facade.am_i_baton_holder() {
            Ok(holder) => holder,
            Err(e) => {
                spdlog::warn!("Could not check baton holder during request: {e}");
                true
            }
        };
        if !still_holder {
            self.holder_lost();
        }
        self.is_resolved()
    }

    /// Blocking countdown loop. Returns once the popup is resolved by any path.
    ///
    /// The holder is checked before every tick, so losing the baton in the last second
    /// still resolves as a release.
    pub fn run_countdown(&self, clock: &dyn Clock) {
        if self.check_holder() {
            return;
        }
        loop {
            let seconds_remaining = match self.state() {
                PopupState::Resolved(_) => return,
                PopupState::Waiting { seconds_remaining } => seconds_remaining,
            };
            self.shared.ui.post(UiEvent::RequestPending {
                requester: self.requester(),
                seconds_remaining,
            });
            clock.sleep(COUNTDOWN_TICK);
            if self.check_holder() {
                return;
            }
            if self.shared.transition(|p| p.tick()).is_some() {
                return;
            }
        }
    }
}
