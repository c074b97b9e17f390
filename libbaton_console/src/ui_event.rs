use std::sync::mpsc::{self, Receiver, Sender};

use super::baton_state::BatonState;
use super::client_details::ClientDetails;
use super::message_log::ChatMessage;
use super::request_popup::PopupOutcome;

/// Work handed from background threads to the single UI thread.
///
/// The UI drains these in order; no background thread touches a widget directly.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    BatonStateChanged(BatonState),
    /// Non-fatal, dismissible notice
    Notice(String),
    RequestPending {
        requester: ClientDetails,
        seconds_remaining: u64,
    },
    RequestResolved {
        requester: ClientDetails,
        outcome: PopupOutcome,
    },
    ShutdownWarning {
        seconds_remaining: u64,
    },
    ShutdownWarningCancelled,
    ShowWait,
    HideWait,
    Message(ChatMessage),
    Terminated,
}

/// Sending half of the UI queue.
///
/// Posting never fails from the caller's point of view: if the UI has gone away the
/// event is dropped and logged.
#[derive(Debug, Clone)]
pub struct UiSender {
    tx: Sender<UiEvent>,
}

impl UiSender {
    pub fn post(&self, event: UiEvent) {
        if let Err(e) = self.tx.send(event) {
            spdlog::debug!("UI queue closed, dropped event: {:?}", e.0);
        }
    }

    pub fn notice(&self, text: impl Into<String>) {
        self.post(UiEvent::Notice(text.into()))
    }
}

/// Create a connected UI queue
pub fn ui_channel() -> (UiSender, Receiver<UiEvent>) {
    let (tx, rx) = mpsc::channel::<UiEvent>();
    (UiSender { tx }, rx)
}
