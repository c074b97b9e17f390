//! # baton_console
//!
//! Part of the baton_console crate family.
//!
//! This is the operator console for baton (exclusive control) handling with a GUI using
//! [egui](https://github.com/emilk/egui).
//!
//! ## Install
//!
//! Use `cargo install --path ./baton_console`
//!
//! ## Use
//!
//! To launch the application simply invoke it after it is installed
//!
//! ```bash
//! baton_console
//! ```
//!
//! Fill out the identity fields (or load a configuration with File->Open) and click
//! Connect. The console connects to an in-process simulated control server populated
//! with the peers listed in the configuration, so the whole request/release flow can be
//! exercised from one window.
//!
//! ## Panels
//!
//! - Baton: who holds the baton, the Request/Take/Release buttons and the client table
//! with a Pass button per client.
//! - Messages: the session message log and a box to send a message to every client.
//! - Simulated peers: make a peer request, take or release the baton, start a fake scan
//! to see the shutdown wait, or stop the server's lease renewals to see the watchdog.
//!
//! Configurations can be saved using File->Save and loaded using File->Open

mod app;
use app::ConsoleApp;
use std::path::PathBuf;
use std::sync::Arc;

/// The program entry point
fn main() {
    // Setup logging to a file
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./baton_console.log"))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()
            .expect("Could not create the log file"),
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()
            .expect("Could not create the logger"),
    );
    spdlog::set_default_logger(logger);
    spdlog::info!("Starting baton console UI");

    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title("Baton Console")
            .with_inner_size(eframe::epaint::vec2(760.0, 640.0))
            .with_min_inner_size(eframe::epaint::vec2(600.0, 400.0)),
        ..Default::default()
    };
    match eframe::run_native(
        "baton_console",
        native_options,
        Box::new(|cc| Ok(Box::new(ConsoleApp::new(cc)))),
    ) {
        Ok(()) => (),
        Err(e) => spdlog::error!("Eframe error: {}", e),
    }
}
