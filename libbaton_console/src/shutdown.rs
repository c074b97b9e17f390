use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use super::clock::Clock;
use super::config::Config;
use super::facade::{CommandStatus, ControlFacade};
use super::ui_event::{UiEvent, UiSender};

/// Ends the process once the sequencer is done
pub trait Terminator: Send + Sync {
    fn terminate(&self, exit_code: i32);
}

/// Exits the current process
#[derive(Debug, Default)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, exit_code: i32) {
        spdlog::info!("Exiting with code {exit_code}");
        spdlog::default_logger().flush();
        std::process::exit(exit_code)
    }
}

type TeardownTask = Box<dyn FnOnce() + Send>;

/// What happened during a shutdown run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub polls: u64,
    /// True if the bounded wait expired before both queues went idle
    pub gave_up_waiting: bool,
}

/// Stops running scans and scripts, waits for the server to go idle, then tears the
/// client down and terminates.
pub struct ShutdownSequencer {
    facade: Arc<dyn ControlFacade>,
    ui: UiSender,
    clock: Arc<dyn Clock>,
    terminator: Arc<dyn Terminator>,
    poll_interval: Duration,
    max_wait: Option<Duration>,
    teardown: Mutex<Vec<TeardownTask>>,
}

impl ShutdownSequencer {
    pub fn new(
        config: &Config,
        facade: Arc<dyn ControlFacade>,
        ui: UiSender,
        clock: Arc<dyn Clock>,
        terminator: Arc<dyn Terminator>,
    ) -> Self {
        Self {
            facade,
            ui,
            clock,
            terminator,
            poll_interval: Duration::from_millis(config.shutdown_poll_millis),
            max_wait: config.shutdown_max_wait_seconds.map(Duration::from_secs),
            teardown: Mutex::new(Vec::new()),
        }
    }

    /// Register work to run after the server is idle and before disconnecting, such as
    /// stopping background loops or flushing logs. Tasks run in registration order.
    pub fn add_teardown(&self, task: impl FnOnce() + Send + 'static) {
        self.teardown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(task));
    }

    fn is_idle(&self) -> bool {
        let scan = self.facade.get_scan_status().unwrap_or_else(|e| {
            spdlog::warn!("Could not read scan status: {e}");
            CommandStatus::Running
        });
        let script = self.facade.get_script_status().unwrap_or_else(|e| {
            spdlog::warn!("Could not read script status: {e}");
            CommandStatus::Running
        });
        scan.is_idle() && script.is_idle()
    }

    /// Run the whole sequence on the calling thread
    pub fn run(&self) -> ShutdownReport {
        spdlog::info!("Shutdown: aborting running commands");
        if let Err(e) = self.facade.abort_commands() {
            spdlog::error!("Failed to abort commands: {e}");
        }

        self.ui.post(UiEvent::ShowWait);
        let started = self.clock.now();
        let mut polls: u64 = 0;
        let mut gave_up_waiting = false;
        loop {
            polls += 1;
            if self.is_idle() {
                break;
            }
            if let Some(max_wait) = self.max_wait {
                if self.clock.now() - started >= max_wait {
                    spdlog::warn!(
                        "Server still busy after {}s, shutting down anyway",
                        max_wait.as_secs()
                    );
                    gave_up_waiting = true;
                    break;
                }
            }
            self.clock.sleep(self.poll_interval);
        }
        self.ui.post(UiEvent::HideWait);
        spdlog::info!("Shutdown: server idle after {polls} polls");

        let tasks: Vec<TeardownTask> =
            std::mem::take(&mut *self.teardown.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            task();
        }
        if let Err(e) = self.facade.disconnect() {
            spdlog::error!("Failed to disconnect from the control server: {e}");
        }
        self.ui.post(UiEvent::Terminated);
        self.terminator.terminate(0);

        ShutdownReport {
            polls,
            gave_up_waiting,
        }
    }

    /// Run the sequence on a dedicated thread so the UI can keep repainting
    pub fn spawn(self: Arc<Self>) -> std::io::Result<JoinHandle<ShutdownReport>> {
        std::thread::Builder::new()
            .name(String::from("shutdown"))
            .spawn(move || self.run())
    }
}
