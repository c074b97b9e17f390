use clap::{Arg, ArgAction, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use libbaton_console::clock::{CancelToken, SystemClock};
use libbaton_console::config::Config;
use libbaton_console::console::BatonConsole;
use libbaton_console::error::ConfigError;
use libbaton_console::facade::{CommandStatus, ControlFacade};
use libbaton_console::shutdown::ProcessTerminator;
use libbaton_console::sim_server::{SimulatedClient, SimulatedServer};
use libbaton_console::ui_event::{ui_channel, UiEvent};

const HELP: &str = "Commands:
  status              show who holds the baton and the client table
  request             ask the holder for the baton
  claim               take the baton outright
  release             give the baton back to the server
  assign <n>          pass the baton to client #n
  yes | no            release or keep the baton for an open request
  cancel              cancel a pending shutdown warning
  msg <text>          send a message to every client
  peer <n> request|take|release
                      act as simulated peer client #n
  scan                pretend a scan is running
  stop-renewals       stop the server's lease renewal pushes
  quit                shut down";

fn make_template_config(path: &Path) -> Result<(), ConfigError> {
    Config::default().write_config_file(path)
}

fn countdown_bar(pb_manager: &MultiProgress, length: u64, template: &str) -> ProgressBar {
    let bar = pb_manager.add(ProgressBar::new(length));
    if let Ok(style) = ProgressStyle::with_template(template) {
        bar.set_style(style);
    }
    bar
}

/// Print everything the console wants shown. Returns when the console terminates.
fn render(events: Receiver<UiEvent>, request_timeout: u64) {
    let pb_manager = MultiProgress::new();
    let mut request_bar: Option<ProgressBar> = None;
    let mut warning_bar: Option<ProgressBar> = None;
    let mut wait_spinner: Option<ProgressBar> = None;
    let print = |line: String| {
        if pb_manager.println(&line).is_err() {
            println!("{line}");
        }
    };

    for event in events.iter() {
        match event {
            UiEvent::BatonStateChanged(state) => print(state.holder_label()),
            UiEvent::Notice(text) => print(format!("! {text}")),
            UiEvent::RequestPending {
                requester,
                seconds_remaining,
            } => {
                let bar = request_bar.get_or_insert_with(|| {
                    print(format!(
                        "{} has requested the baton. Answer with yes or no.",
                        requester.describe()
                    ));
                    countdown_bar(
                        &pb_manager,
                        request_timeout,
                        "Baton request {bar:40.yellow} {msg}",
                    )
                });
                bar.set_position(request_timeout.saturating_sub(seconds_remaining));
                bar.set_message(format!("{seconds_remaining} s left"));
            }
            UiEvent::RequestResolved { requester, outcome } => {
                if let Some(bar) = request_bar.take() {
                    bar.finish_and_clear();
                }
                let verdict = if outcome.is_affirmative() {
                    "released"
                } else {
                    "kept"
                };
                print(format!(
                    "Request from {}: baton {verdict} ({outcome:?})",
                    requester.describe()
                ));
            }
            UiEvent::ShutdownWarning { seconds_remaining } => {
                let bar = warning_bar.get_or_insert_with(|| {
                    print(String::from(
                        "No lease renewal from the server. Type cancel to stay connected.",
                    ));
                    let bar = countdown_bar(
                        &pb_manager,
                        seconds_remaining,
                        "Shutdown {bar:40.red} {msg}",
                    );
                    bar.set_message(format!("{seconds_remaining} s left"));
                    bar
                });
                bar.set_position(bar.length().unwrap_or(0).saturating_sub(seconds_remaining));
                bar.set_message(format!("{seconds_remaining} s left"));
            }
            UiEvent::ShutdownWarningCancelled => {
                if let Some(bar) = warning_bar.take() {
                    bar.finish_and_clear();
                }
                print(String::from("Shutdown warning cancelled"));
            }
            UiEvent::ShowWait => {
                if let Some(bar) = warning_bar.take() {
                    bar.finish_and_clear();
                }
                let spinner = pb_manager.add(ProgressBar::new_spinner());
                spinner.set_message("Stopping scans and scripts...");
                spinner.enable_steady_tick(Duration::from_millis(100));
                wait_spinner = Some(spinner);
            }
            UiEvent::HideWait => {
                if let Some(spinner) = wait_spinner.take() {
                    spinner.finish_and_clear();
                }
            }
            UiEvent::Message(message) => print(message.display()),
            UiEvent::Terminated => {
                print(String::from("Disconnected."));
                break;
            }
        }
    }
}

fn print_status(console: &BatonConsole) {
    match console.control().state() {
        Some(state) => {
            println!("{}", state.holder_label());
            for client in state.clients() {
                println!(
                    "  #{:<3} {:<16} {:<16} {:<12} level {}{}",
                    client.index,
                    client.user_id,
                    client.hostname,
                    client.visit_id,
                    client.authorisation_level,
                    if client.has_baton { "  [baton]" } else { "" }
                );
            }
        }
        None => println!("No baton state from the server yet"),
    }
}

fn peer_command(peers: &[SimulatedClient], args: &[&str]) {
    let (Some(index), Some(action)) = (args.first(), args.get(1)) else {
        println!("Usage: peer <n> request|take|release");
        return;
    };
    let Some(peer) = index
        .parse::<i32>()
        .ok()
        .and_then(|n| peers.iter().find(|p| p.index() == n))
    else {
        println!("No simulated peer #{index}");
        return;
    };
    let result = match *action {
        "request" => peer.request_baton().map(|_| ()),
        "take" => peer.take_baton(),
        "release" => peer.return_baton(),
        other => {
            println!("Unknown peer action {other}");
            return;
        }
    };
    if let Err(e) = result {
        spdlog::warn!("Peer client #{} failed: {e}", peer.index());
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("baton_console_cli")
        .about("Terminal console for baton (exclusive control) handling")
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to the configuration file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log debug messages"),
        )
        .get_matches();

    // Initialize feedback
    let level = if matches.get_flag("verbose") {
        spdlog::Level::Debug
    } else {
        spdlog::Level::Info
    };
    spdlog::default_logger().set_level_filter(spdlog::LevelFilter::MoreSevereEqual(level));

    // Parse the cli
    let config_path = matches.get_one::<String>("path").map(PathBuf::from);

    if let Some(("new", _)) = matches.subcommand() {
        let Some(path) = config_path else {
            spdlog::error!("A path is required to make a template config");
            std::process::exit(1);
        };
        spdlog::info!("Making a template config at {}...", path.to_string_lossy());
        match make_template_config(&path) {
            Ok(()) => spdlog::info!("Done."),
            Err(e) => {
                spdlog::error!("{e}");
                std::process::exit(1);
            }
        }
        return;
    }

    // Load our config
    let config = match &config_path {
        Some(path) => {
            spdlog::info!("Loading config from {}...", path.to_string_lossy());
            match Config::read_config_file(path) {
                Ok(c) => c,
                Err(e) => {
                    spdlog::error!("{e}");
                    std::process::exit(1);
                }
            }
        }
        None => {
            spdlog::info!("No config given, using the defaults");
            Config::default()
        }
    };
    if let Err(e) = config.validate() {
        spdlog::error!("{e}");
        std::process::exit(1);
    }
    spdlog::info!("Config successfully loaded.");
    spdlog::info!(
        "User: {} Host: {} Visit: {} Level: {}",
        config.user_id,
        config.hostname,
        config.visit_id,
        config.authorisation_level
    );
    spdlog::info!(
        "Request popup: {} Timeout: {} s Release on timeout: {}",
        config.request_popup_enabled,
        config.request_timeout_seconds,
        config.accept_request_on_timeout
    );
    spdlog::info!("Renewal watchdog: {}", config.watchdog_enabled);

    // Bring up the simulated server and its peers
    let sim = config.simulation.clone();
    let server = SimulatedServer::with_abort_delay(sim.abort_delay_polls);
    let peers: Vec<SimulatedClient> = sim
        .peers
        .iter()
        .map(|peer| {
            let (client, _) = server.connect(
                &peer.user_id,
                &peer.hostname,
                &config.visit_id,
                peer.authorisation_level,
            );
            spdlog::info!("Simulated peer {} is client #{}", peer.user_id, client.index());
            client
        })
        .collect();
    let (me, notifications) = server.connect(
        &config.user_id,
        &config.hostname,
        &config.visit_id,
        config.authorisation_level,
    );

    let (ui, ui_rx) = ui_channel();
    let request_timeout = config.request_timeout_seconds;
    let renderer = std::thread::spawn(move || render(ui_rx, request_timeout));

    let console = match BatonConsole::new(
        config,
        Arc::new(me),
        ui,
        Arc::new(SystemClock),
        Arc::new(ProcessTerminator),
    ) {
        Ok(c) => c,
        Err(e) => {
            spdlog::error!("Could not start the console: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = console.start(notifications) {
        spdlog::error!("Could not start the console: {e}");
        std::process::exit(1);
    }

    let renewals = CancelToken::new();
    if let Some(seconds) = sim.lease_renew_seconds {
        if let Err(e) = server.start_lease_renewal(Duration::from_secs(seconds), renewals.clone()) {
            spdlog::error!("Could not start lease renewals: {e}");
        }
    }

    println!("{HELP}");
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                spdlog::error!("Could not read input: {e}");
                break;
            }
        };
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => continue,
            ["status"] => print_status(&console),
            ["request"] => console.control().request(),
            ["claim"] => console.control().claim(),
            ["release"] => console.control().release(),
            ["assign", target] => match target.parse::<i32>() {
                Ok(index) => console.control().assign(index),
                Err(_) => println!("Not a client number: {target}"),
            },
            ["yes"] => console.answer_request(true),
            ["no"] => console.answer_request(false),
            ["cancel"] => {
                if !console.cancel_shutdown_warning() {
                    println!("No shutdown warning to cancel");
                }
            }
            ["msg", ..] => {
                let text = line.trim_start().trim_start_matches("msg").trim();
                console.send_message(text);
            }
            ["peer", args @ ..] => peer_command(&peers, args),
            ["scan"] => server.set_command_status(CommandStatus::Running, CommandStatus::Idle),
            ["stop-renewals"] => {
                renewals.cancel();
                spdlog::info!("Lease renewals stopped");
            }
            ["quit"] | ["shutdown"] => break,
            ["help"] => println!("{HELP}"),
            _ => println!("Unknown command, type help for the list"),
        }
        if console.is_shutting_down() {
            break;
        }
    }

    console.shutdown();
    if renderer.join().is_err() {
        spdlog::error!("Failed to join the render thread!");
    }
}
