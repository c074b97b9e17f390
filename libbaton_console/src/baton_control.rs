use std::sync::{Arc, Mutex};

use super::baton_state::BatonState;
use super::facade::ControlFacade;
use super::ui_event::{UiEvent, UiSender};

/// The baton mirror and the user's baton actions.
///
/// Every action is a single fire-and-forget call on the facade. Failures are logged and
/// posted to the UI as notices; nothing is retried. The mirrored state is only a cache:
/// the last successful refresh wins.
pub struct BatonControl {
    facade: Arc<dyn ControlFacade>,
    ui: UiSender,
    state: Mutex<Option<BatonState>>,
}

impl BatonControl {
    pub fn new(facade: Arc<dyn ControlFacade>, ui: UiSender) -> Self {
        Self {
            facade,
            ui,
            state: Mutex::new(None),
        }
    }

    /// Re-read the baton state from the server and push it to the UI.
    ///
    /// Safe to call from any thread, any number of times. A snapshot that fails to load
    /// or names two holders leaves the previous mirror untouched.
    pub fn refresh(&self) {
        match BatonState::fetch(self.facade.as_ref()) {
            Ok(state) => {
                spdlog::debug!("Baton refresh: {}", state.holder_label());
                *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(state.clone());
                self.ui.post(UiEvent::BatonStateChanged(state));
            }
            Err(e) => {
                spdlog::error!("Could not refresh baton state: {e}");
                self.ui.notice(format!("Could not refresh baton state: {e}"));
            }
        }
    }

    /// Last successfully mirrored state
    pub fn state(&self) -> Option<BatonState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Queue a request for the baton with the server
    pub fn request(&self) {
        match self.facade.request_baton() {
            Ok(true) => spdlog::info!("Baton request queued"),
            Ok(false) => {
                spdlog::warn!("Baton request already queued");
                self.ui
                    .notice("You have already requested the baton; please wait for a reply.");
            }
            Err(e) => self.report("request the baton", e),
        }
    }

    /// Take the baton without asking the holder
    pub fn claim(&self) {
        if let Some(state) = self.state() {
            if !state.can_claim() {
                spdlog::warn!("Claim refused locally: {}", state.holder_label());
                self.ui
                    .notice("The current holder outranks you; request the baton instead.");
                return;
            }
        }
        match self.facade.take_baton() {
            Ok(()) => spdlog::info!("Baton taken"),
            Err(e) => self.report("take the baton", e),
        }
    }

    pub fn release(&self) {
        if let Some(state) = self.state() {
            if !state.can_release() {
                spdlog::warn!("Release ignored, this client does not hold the baton");
                return;
            }
        }
        match self.facade.return_baton() {
            Ok(()) => spdlog::info!("Baton released"),
            Err(e) => self.report("release the baton", e),
        }
    }

    /// Hand the baton to another client
    pub fn assign(&self, target_index: i32) {
        if let Some(state) = self.state() {
            if !state.can_assign(target_index) {
                spdlog::warn!("Cannot pass the baton to client #{target_index}");
                self.ui
                    .notice(format!("You cannot pass the baton to client #{target_index}."));
                return;
            }
        }
        match self.facade.assign_baton(target_index) {
            Ok(()) => spdlog::info!("Baton passed to client #{target_index}"),
            Err(e) => self.report(&format!("pass the baton to client #{target_index}"), e),
        }
    }

    fn report(&self, action: &str, e: impl std::fmt::Display) {
        spdlog::error!("Failed to {action}: {e}");
        self.ui.notice(format!("Failed to {action}: {e}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_details::ClientDetails;
    use crate::error::FacadeError;
    use crate::facade::CommandStatus;
    use crate::sim_server::SimulatedServer;
    use crate::ui_event::ui_channel;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Client 2 holds the baton; once `torn` is set client 3 claims it too
    #[derive(Default)]
    struct TornFacade {
        torn: AtomicBool,
    }

    fn client(index: i32, has_baton: bool) -> ClientDetails {
        let mut c = ClientDetails::new(index, &format!("user{index}"), "ws", "cm1-1", 1);
        c.has_baton = has_baton;
        c
    }

    impl ControlFacade for TornFacade {
        fn is_baton_held(&self) -> Result<bool, FacadeError> {
            Ok(true)
        }
        fn am_i_baton_holder(&self) -> Result<bool, FacadeError> {
            Ok(false)
        }
        fn get_baton_holder(&self) -> Result<Option<ClientDetails>, FacadeError> {
            Ok(Some(client(2, true)))
        }
        fn get_other_client_information(&self) -> Result<Vec<ClientDetails>, FacadeError> {
            let torn = self.torn.load(Ordering::SeqCst);
            Ok(vec![client(2, true), client(3, torn)])
        }
        fn get_my_details(&self) -> Result<ClientDetails, FacadeError> {
            Ok(client(1, false))
        }
        fn request_baton(&self) -> Result<bool, FacadeError> {
            Ok(true)
        }
        fn take_baton(&self) -> Result<(), FacadeError> {
            Ok(())
        }
        fn return_baton(&self) -> Result<(), FacadeError> {
            Ok(())
        }
        fn assign_baton(&self, _client_index: i32) -> Result<(), FacadeError> {
            Ok(())
        }
        fn send_message(&self, _text: &str) -> Result<(), FacadeError> {
            Ok(())
        }
        fn get_scan_status(&self) -> Result<CommandStatus, FacadeError> {
            Ok(CommandStatus::Idle)
        }
        fn get_script_status(&self) -> Result<CommandStatus, FacadeError> {
            Ok(CommandStatus::Idle)
        }
        fn abort_commands(&self) -> Result<(), FacadeError> {
            Ok(())
        }
        fn disconnect(&self) -> Result<(), FacadeError> {
            Ok(())
        }
    }

    fn drain(rx: &std::sync::mpsc::Receiver<UiEvent>) -> Vec<UiEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_refresh_posts_state() {
        let server = SimulatedServer::new();
        let (alice, _alice_rx) = server.connect("alice", "ws1", "cm1-1", 1);
        let (ui, rx) = ui_channel();
        let control = BatonControl::new(Arc::new(alice), ui);
        control.refresh();
        let events = drain(&rx);
        assert!(matches!(events.as_slice(), [UiEvent::BatonStateChanged(s)] if !s.is_held));
    }

    #[test]
    fn test_second_request_is_a_notice() {
        let server = SimulatedServer::new();
        let (alice, _alice_rx) = server.connect("alice", "ws1", "cm1-1", 1);
        let (bob, _bob_rx) = server.connect("bob", "ws2", "cm1-1", 1);
        alice.take_baton().unwrap();

        let (ui, rx) = ui_channel();
        let control = BatonControl::new(Arc::new(bob), ui);
        control.request();
        assert!(drain(&rx).is_empty());
        control.request();
        assert!(matches!(drain(&rx).as_slice(), [UiEvent::Notice(_)]));
    }

    #[test]
    fn test_claim_refused_when_outranked() {
        let server = SimulatedServer::new();
        let (boss, _boss_rx) = server.connect("boss", "ws1", "cm1-1", 3);
        let (user, _user_rx) = server.connect("user", "ws2", "cm1-1", 1);
        boss.take_baton().unwrap();

        let (ui, rx) = ui_channel();
        let control = BatonControl::new(Arc::new(user.clone()), ui);
        control.refresh();
        control.claim();
        let events = drain(&rx);
        assert!(matches!(events.last(), Some(UiEvent::Notice(_))));
        assert!(!user.am_i_baton_holder().unwrap());
    }

    #[test]
    fn test_assign_and_release() {
        let server = SimulatedServer::new();
        let (alice, _alice_rx) = server.connect("alice", "ws1", "cm1-1", 1);
        let (bob, _bob_rx) = server.connect("bob", "ws2", "cm1-1", 1);
        let bob_index = bob.get_my_details().unwrap().index;

        let (ui, _rx) = ui_channel();
        let control = BatonControl::new(Arc::new(alice.clone()), ui);
        control.claim();
        control.refresh();
        assert!(control.state().unwrap().am_i_holder);

        control.assign(bob_index);
        assert!(bob.am_i_baton_holder().unwrap());

        bob.return_baton().unwrap();
        assert!(!server.is_held());
    }

    #[test]
    fn test_facade_failure_becomes_notice() {
        let server = SimulatedServer::new();
        let (alice, _alice_rx) = server.connect("alice", "ws1", "cm1-1", 1);
        alice.disconnect().unwrap();

        let (ui, rx) = ui_channel();
        let control = BatonControl::new(Arc::new(alice), ui);
        control.release();
        control.refresh();
        assert!(matches!(drain(&rx).as_slice(), [UiEvent::Notice(_), UiEvent::Notice(_)]));
    }

    #[test]
    fn test_torn_snapshot_keeps_previous_mirror() {
        let facade = Arc::new(TornFacade::default());
        let (ui, rx) = ui_channel();
        let control = BatonControl::new(facade.clone(), ui);
        control.refresh();
        let before = control.state().unwrap();
        assert_eq!(before.holder_index(), Some(2));
        drain(&rx);

        facade.torn.store(true, Ordering::SeqCst);
        control.refresh();
        assert_eq!(control.state(), Some(before));
        assert!(matches!(drain(&rx).as_slice(), [UiEvent::Notice(_)]));
    }
}
