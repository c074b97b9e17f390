use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use eframe::egui::{Color32, DragValue, RichText};
use rfd::FileDialog;

use libbaton_console::baton_state::BatonState;
use libbaton_console::client_details::ClientDetails;
use libbaton_console::clock::{CancelToken, SystemClock};
use libbaton_console::config::Config;
use libbaton_console::console::BatonConsole;
use libbaton_console::error::ConsoleError;
use libbaton_console::facade::{CommandStatus, ControlFacade};
use libbaton_console::message_log::ChatMessage;
use libbaton_console::shutdown::ProcessTerminator;
use libbaton_console::sim_server::{SimulatedClient, SimulatedServer};
use libbaton_console::ui_event::{ui_channel, UiEvent};

fn render_error_dialog(show: &mut bool, ctx: &eframe::egui::Context) {
    eframe::egui::Window::new("Error")
        .open(show)
        .show(ctx, |ui| {
            ui.label(
                "There was an error! Check the log file baton_console.log for more information.",
            )
        });
}

/// A running console attached to the simulated server
struct Session {
    console: Arc<BatonConsole>,
    server: SimulatedServer,
    peers: Vec<SimulatedClient>,
    renewals: CancelToken,
    ui_rx: mpsc::Receiver<UiEvent>,
}

/// What a peer button asked for
enum PeerAction {
    Request,
    Take,
    Release,
}

/// The UI app which inherits the eframe::App trait.
///
/// Owns the configuration before connecting and the session afterwards. Everything the
/// background threads want shown arrives through the session's UI queue.
pub struct ConsoleApp {
    config: Config,
    session: Option<Session>,
    baton: Option<BatonState>,
    notices: Vec<String>,
    messages: Vec<ChatMessage>,
    draft: String,
    request: Option<(ClientDetails, u64)>,
    shutdown_warning: Option<u64>,
    show_wait: bool,
    renewals_paused: bool,
    show_error_window: bool,
}

impl ConsoleApp {
    /// Create the application
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let mut visuals = eframe::egui::Visuals::dark();
        visuals.override_text_color = Some(Color32::LIGHT_GRAY);
        cc.egui_ctx.set_visuals(visuals);
        cc.egui_ctx.set_theme(eframe::egui::Theme::Dark);
        ConsoleApp {
            config: Config::default(),
            session: None,
            baton: None,
            notices: vec![],
            messages: vec![],
            draft: String::new(),
            request: None,
            shutdown_warning: None,
            show_wait: false,
            renewals_paused: false,
            show_error_window: false,
        }
    }

    /// Connect to a fresh simulated server populated with the configured peers
    fn connect(&mut self) -> Result<(), ConsoleError> {
        let sim = &self.config.simulation;
        let server = SimulatedServer::with_abort_delay(sim.abort_delay_polls);
        let peers = sim
            .peers
            .iter()
            .map(|peer| {
                let (client, _) = server.connect(
                    &peer.user_id,
                    &peer.hostname,
                    &self.config.visit_id,
                    peer.authorisation_level,
                );
                client
            })
            .collect();
        let (me, notifications) = server.connect(
            &self.config.user_id,
            &self.config.hostname,
            &self.config.visit_id,
            self.config.authorisation_level,
        );

        let (ui, ui_rx) = ui_channel();
        let console = BatonConsole::new(
            self.config.clone(),
            Arc::new(me),
            ui,
            Arc::new(SystemClock),
            Arc::new(ProcessTerminator),
        )?;
        console.start(notifications)?;

        let renewals = CancelToken::new();
        if let Some(seconds) = sim.lease_renew_seconds {
            server.start_lease_renewal(Duration::from_secs(seconds), renewals.clone())?;
        }

        spdlog::info!("Connected as {}", self.config.user_id);
        self.messages.clear();
        self.renewals_paused = false;
        self.session = Some(Session {
            console,
            server,
            peers,
            renewals,
            ui_rx,
        });
        Ok(())
    }

    /// Write the current Config to a file
    fn write_config(&mut self, path: &Path) {
        if let Err(e) = self.config.write_config_file(path) {
            self.show_error_window = true;
            spdlog::error!("Could not write config to {}: {}", path.display(), e);
        }
    }

    /// Read the Config from a file
    fn read_config(&mut self, path: &Path) {
        match Config::read_config_file(path) {
            Ok(conf) => self.config = conf,
            Err(e) => {
                self.show_error_window = true;
                spdlog::error!("{}", e)
            }
        }
    }

    fn poll_messages(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        // Check messages
        loop {
            match session.ui_rx.try_recv() {
                Ok(event) => match event {
                    UiEvent::BatonStateChanged(state) => self.baton = Some(state),
                    UiEvent::Notice(text) => self.notices.push(text),
                    UiEvent::RequestPending {
                        requester,
                        seconds_remaining,
                    } => self.request = Some((requester, seconds_remaining)),
                    UiEvent::RequestResolved { requester, outcome } => {
                        spdlog::info!(
                            "Request from {} resolved: {:?}",
                            requester.describe(),
                            outcome
                        );
                        self.request = None;
                    }
                    UiEvent::ShutdownWarning { seconds_remaining } => {
                        self.shutdown_warning = Some(seconds_remaining)
                    }
                    UiEvent::ShutdownWarningCancelled => self.shutdown_warning = None,
                    UiEvent::ShowWait => {
                        self.shutdown_warning = None;
                        self.show_wait = true
                    }
                    UiEvent::HideWait => self.show_wait = false,
                    UiEvent::Message(message) => self.messages.push(message),
                    UiEvent::Terminated => spdlog::info!("Console terminated"),
                },
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    spdlog::error!("Channels became disconnected!");
                    self.show_error_window = true;
                    break;
                }
            }
        }
    }

    fn render_config(&mut self, ui: &mut eframe::egui::Ui) {
        ui.label(
            RichText::new("Configuration")
                .color(Color32::LIGHT_BLUE)
                .size(18.0),
        );
        eframe::egui::Grid::new("ConfigGrid").show(ui, |ui| {
            ui.label("User ID:");
            ui.text_edit_singleline(&mut self.config.user_id);
            ui.end_row();

            ui.label("Hostname:");
            ui.text_edit_singleline(&mut self.config.hostname);
            ui.end_row();

            ui.label("Visit:");
            ui.text_edit_singleline(&mut self.config.visit_id);
            ui.end_row();

            ui.label("Authorisation Level");
            ui.add(
                DragValue::new(&mut self.config.authorisation_level)
                    .speed(1)
                    .range(std::ops::RangeInclusive::new(0, 10)),
            );
            ui.end_row();

            ui.checkbox(&mut self.config.request_popup_enabled, "Show request popup");
            ui.checkbox(
                &mut self.config.accept_request_on_timeout,
                "Release on timeout",
            );
            ui.end_row();

            ui.label("Request Timeout (s)");
            ui.add(
                DragValue::new(&mut self.config.request_timeout_seconds)
                    .speed(1)
                    .range(std::ops::RangeInclusive::new(1, 3600)),
            );
            ui.end_row();

            ui.checkbox(&mut self.config.watchdog_enabled, "Renewal watchdog");
            ui.end_row();

            if self.config.watchdog_enabled {
                ui.label("Watchdog Timeout (min)");
                ui.add(
                    DragValue::new(&mut self.config.watchdog_timeout_minutes)
                        .speed(0.1)
                        .range(std::ops::RangeInclusive::new(0.01, 120.0)),
                );
                ui.end_row();

                ui.label("Shutdown Prompt (min)");
                ui.add(
                    DragValue::new(&mut self.config.watchdog_prompt_minutes)
                        .speed(0.1)
                        .range(std::ops::RangeInclusive::new(0.01, 60.0)),
                );
                ui.end_row();
            }

            let log_text = match &self.config.message_log_path {
                Some(p) => p.to_string_lossy().to_string(),
                None => String::from("None"),
            };
            ui.label(format!("Message log: {log_text}"));
            if ui.button("Open...").clicked() {
                if let Some(path) = FileDialog::new()
                    .set_directory(std::env::current_dir().unwrap_or_default())
                    .add_filter("Log file", &["log", "txt"])
                    .save_file()
                {
                    self.config.message_log_path = Some(path);
                }
            }
            if ui.button("None").clicked() {
                self.config.message_log_path = None
            }
            ui.end_row();
        });

        if ui.button("Connect").clicked() {
            if let Err(e) = self.connect() {
                spdlog::error!("Could not connect: {e}");
                self.notices.push(format!("Could not connect: {e}"));
            }
        }
    }

    fn render_baton(&mut self, ui: &mut eframe::egui::Ui) {
        let Some(session) = &self.session else {
            return;
        };
        let control = session.console.control();
        ui.label(
            RichText::new("Baton")
                .color(Color32::LIGHT_BLUE)
                .size(18.0),
        );
        let Some(state) = &self.baton else {
            ui.label("Waiting for the server...");
            return;
        };
        let color = if state.am_i_holder {
            Color32::LIGHT_GREEN
        } else if state.is_held {
            Color32::YELLOW
        } else {
            Color32::LIGHT_GRAY
        };
        ui.colored_label(color, state.holder_label());

        let actions = state.actions();
        ui.horizontal(|ui| {
            if ui
                .add_enabled(actions.request, eframe::egui::Button::new("Request"))
                .clicked()
            {
                control.request();
            }
            if ui
                .add_enabled(actions.claim, eframe::egui::Button::new("Take"))
                .clicked()
            {
                control.claim();
            }
            if ui
                .add_enabled(actions.release, eframe::egui::Button::new("Release"))
                .clicked()
            {
                control.release();
            }
        });

        let mut pass_to = None;
        eframe::egui::Grid::new("ClientGrid")
            .striped(true)
            .show(ui, |ui| {
                ui.label("#");
                ui.label("User");
                ui.label("Host");
                ui.label("Visit");
                ui.label("Level");
                ui.label("Baton");
                ui.end_row();
                for client in state.clients() {
                    ui.label(client.index.to_string());
                    ui.label(client.user_id.as_str());
                    ui.label(client.hostname.as_str());
                    ui.label(client.visit_id.as_str());
                    ui.label(client.authorisation_level.to_string());
                    ui.label(if client.has_baton { "yes" } else { "" });
                    if ui
                        .add_enabled(
                            state.can_assign(client.index),
                            eframe::egui::Button::new("Pass"),
                        )
                        .clicked()
                    {
                        pass_to = Some(client.index);
                    }
                    ui.end_row();
                }
            });
        if let Some(index) = pass_to {
            control.assign(index);
        }
    }

    fn render_messages(&mut self, ui: &mut eframe::egui::Ui) {
        let Some(session) = &self.session else {
            return;
        };
        ui.label(
            RichText::new("Messages")
                .color(Color32::LIGHT_BLUE)
                .size(18.0),
        );
        eframe::egui::ScrollArea::vertical()
            .max_height(150.0)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for message in self.messages.iter() {
                    ui.label(message.display());
                }
            });
        ui.horizontal(|ui| {
            let response = ui.text_edit_singleline(&mut self.draft);
            let entered =
                response.lost_focus() && ui.input(|i| i.key_pressed(eframe::egui::Key::Enter));
            if ui.button("Send").clicked() || entered {
                session.console.send_message(&self.draft);
                self.draft.clear();
            }
        });
    }

    fn render_peers(&mut self, ui: &mut eframe::egui::Ui) {
        let Some(session) = &self.session else {
            return;
        };
        ui.label(
            RichText::new("Simulated Peers")
                .color(Color32::LIGHT_BLUE)
                .size(18.0),
        );
        let mut chosen = None;
        eframe::egui::Grid::new("PeerGrid").show(ui, |ui| {
            for (idx, peer) in session.peers.iter().enumerate() {
                ui.label(format!("client #{}", peer.index()));
                if ui.button("Request").clicked() {
                    chosen = Some((idx, PeerAction::Request));
                }
                if ui.button("Take").clicked() {
                    chosen = Some((idx, PeerAction::Take));
                }
                if ui.button("Release").clicked() {
                    chosen = Some((idx, PeerAction::Release));
                }
                ui.end_row();
            }
        });
        if let Some((idx, action)) = chosen {
            let peer = &session.peers[idx];
            let result = match action {
                PeerAction::Request => peer.request_baton().map(|_| ()),
                PeerAction::Take => peer.take_baton(),
                PeerAction::Release => peer.return_baton(),
            };
            if let Err(e) = result {
                self.notices
                    .push(format!("Peer client #{}: {e}", peer.index()));
            }
        }

        ui.horizontal(|ui| {
            if ui.button("Start scan").clicked() {
                session
                    .server
                    .set_command_status(CommandStatus::Running, CommandStatus::Idle);
            }
            if ui
                .add_enabled(
                    !self.renewals_paused,
                    eframe::egui::Button::new("Stop lease renewals"),
                )
                .clicked()
            {
                spdlog::info!("Lease renewals stopped");
                session.renewals.cancel();
                self.renewals_paused = true;
            }
            if ui.button("Shut down").clicked() {
                session.console.shutdown();
            }
        });
    }

    fn render_windows(&mut self, ctx: &eframe::egui::Context) {
        let Some(session) = &self.session else {
            return;
        };

        if let Some((requester, seconds)) = &self.request {
            eframe::egui::Window::new("Baton Request")
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.label(format!("{} has requested the baton.", requester.describe()));
                    ui.label(format!("Answering automatically in {seconds} s"));
                    ui.horizontal(|ui| {
                        if ui.button("Release").clicked() {
                            session.console.answer_request(true);
                        }
                        if ui.button("Keep").clicked() {
                            session.console.answer_request(false);
                        }
                    });
                });
        }

        if let Some(seconds) = self.shutdown_warning {
            eframe::egui::Window::new("No Lease Renewal")
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.label("The server has stopped renewing the baton lease.");
                    ui.label(format!("Shutting down in {seconds} s"));
                    if ui.button("Cancel").clicked() {
                        session.console.cancel_shutdown_warning();
                    }
                });
        }

        if self.show_wait {
            eframe::egui::Window::new("Please Wait")
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.label("Stopping scans and scripts before shutting down...");
                });
        }
    }

    fn render_notices(&mut self, ctx: &eframe::egui::Context) {
        if self.notices.is_empty() {
            return;
        }
        let mut dismiss = false;
        eframe::egui::Window::new("Notices")
            .collapsible(false)
            .show(ctx, |ui| {
                for notice in self.notices.iter() {
                    ui.label(notice.as_str());
                }
                dismiss = ui.button("Dismiss").clicked();
            });
        if dismiss {
            self.notices.clear();
        }
    }
}

impl eframe::App for ConsoleApp {
    fn update(&mut self, ctx: &eframe::egui::Context, _frame: &mut eframe::Frame) {
        self.poll_messages();
        // Closing the window runs the full shutdown; the terminator ends the process
        if ctx.input(|i| i.viewport().close_requested()) {
            if let Some(session) = &self.session {
                ctx.send_viewport_cmd(eframe::egui::ViewportCommand::CancelClose);
                session.console.shutdown();
            }
        }
        render_error_dialog(&mut self.show_error_window, ctx);
        self.render_windows(ctx);
        self.render_notices(ctx);
        eframe::egui::CentralPanel::default().show(ctx, |ui| {
            //Menus
            ui.menu_button("File", |ui| {
                if ui.button("Open...").clicked() {
                    if let Some(path) = FileDialog::new()
                        .set_directory(std::env::current_dir().unwrap_or_default())
                        .add_filter("YAML file", &["yaml", "yml"])
                        .pick_file()
                    {
                        self.read_config(&path);
                    }
                }
                if ui.button("Save...").clicked() {
                    if let Some(path) = FileDialog::new()
                        .set_directory(std::env::current_dir().unwrap_or_default())
                        .add_filter("YAML file", &["yaml", "yml"])
                        .save_file()
                    {
                        self.write_config(&path);
                    }
                }
            });

            ui.separator();
            if self.session.is_none() {
                self.render_config(ui);
            } else {
                self.render_baton(ui);
                ui.separator();
                self.render_messages(ui);
                ui.separator();
                self.render_peers(ui);
            }

            ctx.request_repaint_after(Duration::from_millis(200));
        });
    }
}
