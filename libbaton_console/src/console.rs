use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use super::baton_control::BatonControl;
use super::client_details::ClientDetails;
use super::clock::{CancelToken, Clock};
use super::config::Config;
use super::error::ConsoleError;
use super::facade::ControlFacade;
use super::message_log::{ChatMessage, MessageLog};
use super::notification::Notification;
use super::request_popup::{PendingRequest, PopupHandle, RequestGuard};
use super::shutdown::{ShutdownSequencer, Terminator};
use super::ui_event::{UiEvent, UiSender};
use super::watchdog::{Watchdog, WatchdogSettings};

const PUMP_WAIT: Duration = Duration::from_millis(250);

/// The baton side of one console session.
///
/// Owns the mirror, the request popup slot, the optional renewal watchdog, the message
/// log and the shutdown sequencer, and reacts to server pushes with one handler per
/// notification kind. Front ends call the user-action methods and drain the UI queue.
pub struct BatonConsole {
    config: Config,
    facade: Arc<dyn ControlFacade>,
    ui: UiSender,
    clock: Arc<dyn Clock>,
    control: BatonControl,
    guard: RequestGuard,
    popup: Mutex<Option<PopupHandle>>,
    watchdog: Option<Watchdog>,
    message_log: Option<Mutex<MessageLog>>,
    sequencer: Arc<ShutdownSequencer>,
    shutdown_started: AtomicBool,
    stop: CancelToken,
}

impl BatonConsole {
    pub fn new(
        config: Config,
        facade: Arc<dyn ControlFacade>,
        ui: UiSender,
        clock: Arc<dyn Clock>,
        terminator: Arc<dyn Terminator>,
    ) -> Result<Arc<Self>, ConsoleError> {
        config.validate()?;

        let message_log = match &config.message_log_path {
            Some(path) => {
                let log = MessageLog::open(path)?;
                for message in log.load_history()? {
                    ui.post(UiEvent::Message(message));
                }
                spdlog::info!("Message log at {}", path.display());
                Some(Mutex::new(log))
            }
            None => None,
        };

        let watchdog = if config.watchdog_enabled {
            let settings = WatchdogSettings::from_config(&config);
            spdlog::info!(
                "Renewal watchdog enabled: warn after {:?}, shut down {:?} later",
                settings.timeout,
                settings.prompt
            );
            Some(Watchdog::new(settings, clock.clone()))
        } else {
            None
        };

        let stop = CancelToken::new();
        let sequencer = Arc::new(ShutdownSequencer::new(
            &config,
            facade.clone(),
            ui.clone(),
            clock.clone(),
            terminator,
        ));
        let pump_stop = stop.clone();
        sequencer.add_teardown(move || pump_stop.cancel());
        if let Some(dog) = &watchdog {
            let dog = dog.clone();
            sequencer.add_teardown(move || dog.stop());
        }

        Ok(Arc::new(Self {
            control: BatonControl::new(facade.clone(), ui.clone()),
            config,
            facade,
            ui,
            clock,
            guard: RequestGuard::new(),
            popup: Mutex::new(None),
            watchdog,
            message_log,
            sequencer,
            shutdown_started: AtomicBool::new(false),
            stop,
        }))
    }

    pub fn control(&self) -> &BatonControl {
        &self.control
    }

    /// Refresh once, then start the notification pump and, when enabled, the watchdog
    pub fn start(
        self: &Arc<Self>,
        notifications: Receiver<Notification>,
    ) -> Result<Vec<JoinHandle<()>>, ConsoleError> {
        self.control.refresh();
        let mut handles = Vec::new();

        let console = Arc::clone(self);
        handles.push(
            std::thread::Builder::new()
                .name(String::from("notification-pump"))
                .spawn(move || console.pump(notifications))?,
        );

        if let Some(dog) = self.watchdog.clone() {
            let console = Arc::clone(self);
            handles.push(
                std::thread::Builder::new()
                    .name(String::from("renewal-watchdog"))
                    .spawn(move || dog.run(&console.ui, || console.shutdown()))?,
            );
        }
        Ok(handles)
    }

    fn pump(&self, notifications: Receiver<Notification>) {
        while !self.stop.is_cancelled() {
            match notifications.recv_timeout(PUMP_WAIT) {
                Ok(notification) => self.handle(notification),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    spdlog::warn!("Notification stream closed");
                    break;
                }
            }
        }
        spdlog::debug!("Notification pump exited");
    }

    /// Stop background loops without tearing the session down
    pub fn stop(&self) {
        self.stop.cancel();
        if let Some(dog) = &self.watchdog {
            dog.stop();
        }
    }

    pub fn handle(&self, notification: Notification) {
        match notification {
            Notification::BatonChanged => self.on_baton_changed(),
            Notification::BatonRequested { requester } => self.on_baton_requested(requester),
            Notification::BatonLeaseRenewRequest => self.on_lease_renewal(),
            Notification::UserMessage {
                source_client_number,
                source_username,
                message,
            } => self.on_user_message(source_client_number, &source_username, &message),
        }
    }

    fn on_baton_changed(&self) {
        self.control.refresh();
        let holder_lost = self
            .control
            .state()
            .is_some_and(|state| !state.am_i_holder);
        if holder_lost {
            if let Some(handle) = self.active_request() {
                spdlog::info!("Baton lost while a request was open");
                handle.holder_lost();
            }
        }
    }

    fn on_baton_requested(&self, requester: ClientDetails) {
        spdlog::info!("Baton requested by {}", requester.describe());
        if !self.config.request_popup_enabled {
            self.ui.notice(format!(
                "{} has requested the baton.",
                requester.describe()
            ));
            return;
        }
        if !self.guard.try_acquire() {
            spdlog::info!(
                "Ignoring request from {}, another request is still open",
                requester.describe()
            );
            return;
        }

        let request = PendingRequest {
            requester,
            timeout_seconds: self.config.request_timeout_seconds,
            auto_accept_on_timeout: self.config.accept_request_on_timeout,
        };
        let handle = PopupHandle::new(
            request,
            self.facade.clone(),
            self.ui.clone(),
            self.guard.clone(),
        );
        *self.popup.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle.clone());

        let clock = self.clock.clone();
        if let Err(e) = std::thread::Builder::new()
            .name(String::from("baton-request"))
            .spawn(move || handle.run_countdown(clock.as_ref()))
        {
            spdlog::error!("Could not start the request countdown: {e}");
            self.guard.release();
        }
    }

    fn on_lease_renewal(&self) {
        spdlog::debug!("Baton lease renewal received");
        if let Some(dog) = &self.watchdog {
            dog.renewal_received();
        }
    }

    fn on_user_message(&self, source_client_number: i32, source_username: &str, message: &str) {
        let message = ChatMessage::new(source_client_number, source_username, message);
        if let Some(log) = &self.message_log {
            if let Err(e) = log
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .append(&message)
            {
                spdlog::error!("Could not write to the message log: {e}");
            }
        }
        self.ui.post(UiEvent::Message(message));
    }

    /// The open request popup, if any
    pub fn active_request(&self) -> Option<PopupHandle> {
        self.popup
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .filter(|handle| !handle.is_resolved())
            .cloned()
    }

    /// The holder's answer to the open request: release (true) or keep (false)
    pub fn answer_request(&self, release: bool) {
        match self.active_request() {
            Some(handle) => {
                handle.answer(release);
            }
            None => spdlog::debug!("No open baton request to answer"),
        }
    }

    pub fn cancel_shutdown_warning(&self) -> bool {
        match &self.watchdog {
            Some(dog) => dog.cancel_warning(&self.ui),
            None => false,
        }
    }

    pub fn send_message(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if let Err(e) = self.facade.send_message(text) {
            spdlog::error!("Could not send message: {e}");
            self.ui.notice(format!("Could not send message: {e}"));
        }
    }

    /// Start the shutdown sequence on its own thread. Later calls do nothing.
    pub fn shutdown(&self) {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            spdlog::debug!("Shutdown already in progress");
            return;
        }
        if let Err(e) = Arc::clone(&self.sequencer).spawn() {
            spdlog::error!("Could not start the shutdown sequence: {e}");
            self.ui.notice(format!("Could not start the shutdown sequence: {e}"));
            self.shutdown_started.store(false, Ordering::SeqCst);
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_started.load(Ordering::SeqCst)
    }
}
