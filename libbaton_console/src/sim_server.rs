use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use fxhash::FxHashMap;

use super::client_details::ClientDetails;
use super::clock::CancelToken;
use super::error::FacadeError;
use super::facade::{CommandStatus, ControlFacade};
use super::notification::Notification;

#[derive(Debug)]
struct ClientEntry {
    details: ClientDetails,
    tx: Option<Sender<Notification>>,
}

impl ClientEntry {
    fn is_connected(&self) -> bool {
        self.tx.is_some()
    }
}

#[derive(Debug, Default)]
struct ServerState {
    clients: FxHashMap<i32, ClientEntry>,
    next_index: i32,
    holder: Option<i32>,
    queue: VecDeque<i32>,
    scan: CommandStatus,
    script: CommandStatus,
    abort_delay_polls: u32,
    settling_polls: Option<u32>,
}

impl ServerState {
    fn details(&self, index: i32) -> Option<ClientDetails> {
        self.clients.get(&index).map(|entry| {
            let mut details = entry.details.clone();
            details.has_baton = self.holder == Some(index);
            details
        })
    }

    fn connected(&self, index: i32) -> Result<(), FacadeError> {
        match self.clients.get(&index) {
            Some(entry) if entry.is_connected() => Ok(()),
            Some(_) => Err(FacadeError::NotConnected),
            None => Err(FacadeError::UnknownClient(index)),
        }
    }

    fn level(&self, index: i32) -> i32 {
        self.clients
            .get(&index)
            .map(|c| c.details.authorisation_level)
            .unwrap_or_default()
    }

    fn notify(&self, index: i32, notification: Notification) {
        if let Some(tx) = self.clients.get(&index).and_then(|c| c.tx.as_ref()) {
            // Clients that stopped listening are skipped
            let _ = tx.send(notification);
        }
    }

    fn broadcast(&self, notification: Notification) {
        for entry in self.clients.values() {
            if let Some(tx) = &entry.tx {
                let _ = tx.send(notification.clone());
            }
        }
    }

    fn set_holder(&mut self, holder: Option<i32>) {
        self.holder = holder;
        if let Some(h) = holder {
            self.queue.retain(|q| *q != h);
        }
        spdlog::debug!("Simulated server: baton holder is now {:?}", holder);
        self.broadcast(Notification::BatonChanged);
    }

    /// Oldest queued requester that is still connected
    fn next_in_queue(&mut self) -> Option<i32> {
        while let Some(next) = self.queue.pop_front() {
            if self.connected(next).is_ok() {
                return Some(next);
            }
        }
        None
    }
}

/// In-process baton authority.
///
/// Stands in for the real command server in the front ends and tests. It owns the
/// client table and the request queue and guarantees a single holder.
#[derive(Debug, Clone, Default)]
pub struct SimulatedServer {
    state: Arc<Mutex<ServerState>>,
}

impl SimulatedServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A server whose aborted scans keep reporting busy for `polls` status queries
    pub fn with_abort_delay(polls: u32) -> Self {
        let server = Self::new();
        server.lock().abort_delay_polls = polls;
        server
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new client. Returns its facade and its notification stream.
    pub fn connect(
        &self,
        user_id: &str,
        hostname: &str,
        visit_id: &str,
        authorisation_level: i32,
    ) -> (SimulatedClient, Receiver<Notification>) {
        let (tx, rx) = mpsc::channel::<Notification>();
        let mut state = self.lock();
        state.next_index += 1;
        let index = state.next_index;
        let details = ClientDetails::new(index, user_id, hostname, visit_id, authorisation_level);
        spdlog::info!("Simulated server: {} connected", details.describe());
        state.clients.insert(
            index,
            ClientEntry {
                details,
                tx: Some(tx),
            },
        );
        (
            SimulatedClient {
                server: self.clone(),
                index,
            },
            rx,
        )
    }

    pub fn is_held(&self) -> bool {
        self.lock().holder.is_some()
    }

    pub fn holder(&self) -> Option<ClientDetails> {
        let state = self.lock();
        state.holder.and_then(|h| state.details(h))
    }

    /// Every connected client ordered by index
    pub fn clients(&self) -> Vec<ClientDetails> {
        let state = self.lock();
        let mut clients: Vec<ClientDetails> = state
            .clients
            .iter()
            .filter(|(_, entry)| entry.is_connected())
            .filter_map(|(index, _)| state.details(*index))
            .collect();
        clients.sort_by_key(|c| c.index);
        clients
    }

    /// Pretend a scan and/or script is running
    pub fn set_command_status(&self, scan: CommandStatus, script: CommandStatus) {
        let mut state = self.lock();
        state.scan = scan;
        state.script = script;
        state.settling_polls = None;
    }

    pub fn push_lease_renewal(&self) {
        self.lock().broadcast(Notification::BatonLeaseRenewRequest);
    }

    /// Push lease renewals to every client until `stop` is cancelled
    pub fn start_lease_renewal(
        &self,
        interval: Duration,
        stop: CancelToken,
    ) -> std::io::Result<JoinHandle<()>> {
        let server = self.clone();
        std::thread::Builder::new()
            .name(String::from("sim-lease-renewal"))
            .spawn(move || {
                while !stop.is_cancelled() {
                    std::thread::sleep(interval);
                    if stop.is_cancelled() {
                        break;
                    }
                    server.push_lease_renewal();
                }
            })
    }
}

/// One client's connection to a [`SimulatedServer`]
#[derive(Debug, Clone)]
pub struct SimulatedClient {
    server: SimulatedServer,
    index: i32,
}

impl SimulatedClient {
    pub fn index(&self) -> i32 {
        self.index
    }
}

impl ControlFacade for SimulatedClient {
    fn is_baton_held(&self) -> Result<bool, FacadeError> {
        let state = self.server.lock();
        state.connected(self.index)?;
        Ok(state.holder.is_some())
    }

    fn am_i_baton_holder(&self) -> Result<bool, FacadeError> {
        let state = self.server.lock();
        state.connected(self.index)?;
        Ok(state.holder == Some(self.index))
    }

    fn get_baton_holder(&self) -> Result<Option<ClientDetails>, FacadeError> {
        let state = self.server.lock();
        state.connected(self.index)?;
        Ok(state.holder.and_then(|h| state.details(h)))
    }

    fn get_other_client_information(&self) -> Result<Vec<ClientDetails>, FacadeError> {
        self.server.lock().connected(self.index)?;
        Ok(self
            .server
            .clients()
            .into_iter()
            .filter(|c| c.index != self.index)
            .collect())
    }

    fn get_my_details(&self) -> Result<ClientDetails, FacadeError> {
        let state = self.server.lock();
        state.connected(self.index)?;
        state
            .details(self.index)
            .ok_or(FacadeError::UnknownClient(self.index))
    }

    fn request_baton(&self) -> Result<bool, FacadeError> {
        let mut state = self.server.lock();
        state.connected(self.index)?;
        let holder = state.holder;
        match holder {
            Some(h) if h == self.index => Ok(true),
            None => {
                state.set_holder(Some(self.index));
                Ok(true)
            }
            Some(_) if state.queue.contains(&self.index) => Ok(false),
            Some(h) => {
                state.queue.push_back(self.index);
                if let Some(requester) = state.details(self.index) {
                    state.notify(h, Notification::BatonRequested { requester });
                }
                Ok(true)
            }
        }
    }

    fn take_baton(&self) -> Result<(), FacadeError> {
        let mut state = self.server.lock();
        state.connected(self.index)?;
        let holder = state.holder;
        match holder {
            Some(h) if h == self.index => Ok(()),
            Some(h) if state.level(self.index) < state.level(h) => {
                Err(FacadeError::NotAuthorised {
                    client: self.index,
                    level: state.level(self.index),
                    holder_level: state.level(h),
                })
            }
            _ => {
                state.set_holder(Some(self.index));
                Ok(())
            }
        }
    }

    fn return_baton(&self) -> Result<(), FacadeError> {
        let mut state = self.server.lock();
        state.connected(self.index)?;
        if state.holder != Some(self.index) {
            return Err(FacadeError::NotHolder(self.index));
        }
        let next = state.next_in_queue();
        state.set_holder(next);
        Ok(())
    }

    fn assign_baton(&self, client_index: i32) -> Result<(), FacadeError> {
        let mut state = self.server.lock();
        state.connected(self.index)?;
        if state.holder != Some(self.index) {
            return Err(FacadeError::NotHolder(self.index));
        }
        if state.connected(client_index).is_err() {
            return Err(FacadeError::UnknownClient(client_index));
        }
        state.set_holder(Some(client_index));
        Ok(())
    }

    fn send_message(&self, text: &str) -> Result<(), FacadeError> {
        let state = self.server.lock();
        state.connected(self.index)?;
        let source_username = state
            .clients
            .get(&self.index)
            .map(|c| c.details.user_id.clone())
            .unwrap_or_default();
        state.broadcast(Notification::UserMessage {
            source_client_number: self.index,
            source_username,
            message: text.to_string(),
        });
        Ok(())
    }

    fn get_scan_status(&self) -> Result<CommandStatus, FacadeError> {
        let mut state = self.server.lock();
        state.connected(self.index)?;
        match state.settling_polls {
            Some(0) => {
                state.scan = CommandStatus::Idle;
                state.script = CommandStatus::Idle;
                state.settling_polls = None;
            }
            Some(n) => state.settling_polls = Some(n - 1),
            None => (),
        }
        Ok(state.scan)
    }

    fn get_script_status(&self) -> Result<CommandStatus, FacadeError> {
        let state = self.server.lock();
        state.connected(self.index)?;
        Ok(state.script)
    }

    fn abort_commands(&self) -> Result<(), FacadeError> {
        let mut state = self.server.lock();
        state.connected(self.index)?;
        if !(state.scan.is_idle() && state.script.is_idle()) {
            spdlog::info!("Simulated server: aborting running commands");
            state.settling_polls = Some(state.abort_delay_polls);
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<(), FacadeError> {
        let mut state = self.server.lock();
        state.connected(self.index)?;
        if let Some(entry) = state.clients.get_mut(&self.index) {
            entry.tx = None;
        }
        state.queue.retain(|q| *q != self.index);
        if state.holder == Some(self.index) {
            let next = state.next_in_queue();
            state.set_holder(next);
        } else {
            state.broadcast(Notification::BatonChanged);
        }
        spdlog::info!("Simulated server: client #{} disconnected", self.index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holders(server: &SimulatedServer) -> usize {
        server.clients().iter().filter(|c| c.has_baton).count()
    }

    #[test]
    fn test_single_holder_through_handoffs() {
        let server = SimulatedServer::new();
        let (a, _ra) = server.connect("a", "h1", "v", 1);
        let (b, _rb) = server.connect("b", "h2", "v", 1);
        let (c, _rc) = server.connect("c", "h3", "v", 5);

        assert_eq!(holders(&server), 0);
        assert!(a.request_baton().unwrap());
        assert_eq!(holders(&server), 1);
        assert!(b.request_baton().unwrap());
        c.take_baton().unwrap();
        assert_eq!(holders(&server), 1);
        assert!(a.take_baton().is_err());
        c.assign_baton(a.index()).unwrap();
        assert_eq!(holders(&server), 1);
        a.return_baton().unwrap();
        // b is still queued
        assert_eq!(server.holder().unwrap().index, b.index());
        assert_eq!(holders(&server), 1);
    }

    #[test]
    fn test_request_notifies_holder_once() {
        let server = SimulatedServer::new();
        let (a, ra) = server.connect("a", "h1", "v", 1);
        let (b, _rb) = server.connect("b", "h2", "v", 1);
        a.take_baton().unwrap();
        let _ = ra.try_iter().count();

        assert!(b.request_baton().unwrap());
        assert!(!b.request_baton().unwrap());
        let requests: Vec<Notification> = ra
            .try_iter()
            .filter(|n| matches!(n, Notification::BatonRequested { .. }))
            .collect();
        assert_eq!(requests.len(), 1);
        match &requests[0] {
            Notification::BatonRequested { requester } => assert_eq!(requester.user_id, "b"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_abort_settles_after_delay() {
        let server = SimulatedServer::with_abort_delay(2);
        let (a, _ra) = server.connect("a", "h1", "v", 1);
        server.set_command_status(CommandStatus::Running, CommandStatus::Running);
        a.abort_commands().unwrap();
        assert_eq!(a.get_scan_status().unwrap(), CommandStatus::Running);
        assert_eq!(a.get_scan_status().unwrap(), CommandStatus::Running);
        assert_eq!(a.get_scan_status().unwrap(), CommandStatus::Idle);
        assert_eq!(a.get_script_status().unwrap(), CommandStatus::Idle);
    }

    #[test]
    fn test_disconnect_passes_baton_on() {
        let server = SimulatedServer::new();
        let (a, _ra) = server.connect("a", "h1", "v", 1);
        let (b, rb) = server.connect("b", "h2", "v", 1);
        a.take_baton().unwrap();
        b.request_baton().unwrap();
        a.disconnect().unwrap();
        assert!(b.am_i_baton_holder().unwrap());
        assert!(rb.try_iter().any(|n| n == Notification::BatonChanged));
        assert!(matches!(a.is_baton_held(), Err(FacadeError::NotConnected)));
    }

    #[test]
    fn test_messages_are_broadcast() {
        let server = SimulatedServer::new();
        let (a, ra) = server.connect("a", "h1", "v", 1);
        let (_b, rb) = server.connect("b", "h2", "v", 1);
        a.send_message("beam is back").unwrap();
        let expected = Notification::UserMessage {
            source_client_number: a.index(),
            source_username: String::from("a"),
            message: String::from("beam is back"),
        };
        assert!(ra.try_iter().any(|n| n == expected));
        assert!(rb.try_iter().any(|n| n == expected));
    }
}
