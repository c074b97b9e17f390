#![allow(dead_code)]

use std::sync::mpsc::Receiver;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use libbaton_console::client_details::ClientDetails;
use libbaton_console::error::FacadeError;
use libbaton_console::facade::{CommandStatus, ControlFacade};
use libbaton_console::shutdown::Terminator;
use libbaton_console::ui_event::UiEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AmIHolder,
    RequestBaton,
    TakeBaton,
    ReturnBaton,
    AssignBaton(i32),
    SendMessage(String),
    ScanStatus,
    ScriptStatus,
    AbortCommands,
    Disconnect,
    Terminate(i32),
}

/// Facade double that records every call in order.
///
/// Also acts as the terminator so shutdown ordering lands in the same log.
#[derive(Debug, Default)]
pub struct RecordingFacade {
    calls: Mutex<Vec<Call>>,
    /// `am_i_baton_holder` answers true this many times, then false. None: always true.
    holder_checks: Mutex<Option<u32>>,
    /// `get_scan_status` answers Running this many times before Idle
    busy_polls: Mutex<u32>,
}

impl RecordingFacade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn losing_baton_after(checks: u32) -> Self {
        let facade = Self::default();
        *facade.holder_checks.lock().unwrap() = Some(checks);
        facade
    }

    pub fn busy_for(polls: u32) -> Self {
        let facade = Self::default();
        *facade.busy_polls.lock().unwrap() = polls;
        facade
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls().iter().filter(|c| *c == wanted).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call)
    }
}

impl ControlFacade for RecordingFacade {
    fn is_baton_held(&self) -> Result<bool, FacadeError> {
        Ok(true)
    }

    fn am_i_baton_holder(&self) -> Result<bool, FacadeError> {
        self.record(Call::AmIHolder);
        let mut checks = self.holder_checks.lock().unwrap();
        match checks.as_mut() {
            None => Ok(true),
            Some(0) => Ok(false),
            Some(n) => {
                *n -= 1;
                Ok(true)
            }
        }
    }

    fn get_baton_holder(&self) -> Result<Option<ClientDetails>, FacadeError> {
        Ok(None)
    }

    fn get_other_client_information(&self) -> Result<Vec<ClientDetails>, FacadeError> {
        Ok(vec![])
    }

    fn get_my_details(&self) -> Result<ClientDetails, FacadeError> {
        Ok(ClientDetails::new(1, "me", "ws1", "cm1-1", 1))
    }

    fn request_baton(&self) -> Result<bool, FacadeError> {
        self.record(Call::RequestBaton);
        Ok(true)
    }

    fn take_baton(&self) -> Result<(), FacadeError> {
        self.record(Call::TakeBaton);
        Ok(())
    }

    fn return_baton(&self) -> Result<(), FacadeError> {
        self.record(Call::ReturnBaton);
        Ok(())
    }

    fn assign_baton(&self, client_index: i32) -> Result<(), FacadeError> {
        self.record(Call::AssignBaton(client_index));
        Ok(())
    }

    fn send_message(&self, text: &str) -> Result<(), FacadeError> {
        self.record(Call::SendMessage(text.to_string()));
        Ok(())
    }

    fn get_scan_status(&self) -> Result<CommandStatus, FacadeError> {
        self.record(Call::ScanStatus);
        let mut busy = self.busy_polls.lock().unwrap();
        if *busy > 0 {
            *busy -= 1;
            Ok(CommandStatus::Running)
        } else {
            Ok(CommandStatus::Idle)
        }
    }

    fn get_script_status(&self) -> Result<CommandStatus, FacadeError> {
        self.record(Call::ScriptStatus);
        Ok(CommandStatus::Idle)
    }

    fn abort_commands(&self) -> Result<(), FacadeError> {
        self.record(Call::AbortCommands);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), FacadeError> {
        self.record(Call::Disconnect);
        Ok(())
    }
}

impl Terminator for RecordingFacade {
    fn terminate(&self, exit_code: i32) {
        self.record(Call::Terminate(exit_code))
    }
}

/// Terminator that only remembers it was called
#[derive(Debug, Default)]
pub struct FlagTerminator {
    pub code: Mutex<Option<i32>>,
}

impl Terminator for FlagTerminator {
    fn terminate(&self, exit_code: i32) {
        *self.code.lock().unwrap() = Some(exit_code);
    }
}

/// Wait on a UI queue until `wanted` matches an event, returning it
pub fn wait_for(
    rx: &Receiver<UiEvent>,
    timeout: Duration,
    wanted: impl Fn(&UiEvent) -> bool,
) -> Option<UiEvent> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        match rx.recv_timeout(remaining) {
            Ok(event) if wanted(&event) => return Some(event),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

pub fn requester() -> ClientDetails {
    ClientDetails::new(7, "bob", "ws7", "cm1-1", 1)
}
