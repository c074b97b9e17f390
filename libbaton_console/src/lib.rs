//! # baton_console
//!
//! baton_console is the baton (exclusive control) side of a beamline operator console,
//! written in Rust. Only one client connected to the command server may drive the
//! beamline at a time; that client "holds the baton". This library keeps a local mirror
//! of who holds it, lets the user request, take, release or pass it, answers other
//! clients' requests through a time-boxed popup, watches for the server's lease renewal
//! pushes, and shuts the client down cleanly when asked to.
//!
//! The library is toolkit independent. The `baton_console` (egui) and
//! `baton_console_cli` (terminal) applications are thin front ends over it.
//!
//! ## Building & Install
//!
//! To build and install the GUI console use `cargo install --path ./baton_console` from
//! the top level repository; the terminal console is installed with
//! `cargo install --path ./baton_console_cli`.
//!
//! ## Architecture
//!
//! - The command server is reached through the [`facade::ControlFacade`] trait. It is the
//!   only authority on who holds the baton; the console never decides that itself.
//! - Server pushes arrive as [`notification::Notification`] values on a channel and are
//!   dispatched by [`console::BatonConsole`], one handler per kind.
//! - Background threads never touch the UI. They post [`ui_event::UiEvent`]s to a queue
//!   that the UI thread drains.
//! - Every timed loop sleeps through a [`clock::Clock`], so the countdowns can be
//!   exercised against a virtual clock.
//! - [`sim_server::SimulatedServer`] is an in-process authority used by the front ends'
//!   demo mode and by the tests.
//!
//! ## Configuration
//!
//! Configurations are YAML files. A template can be generated with
//! `baton_console_cli new -p console.yaml`, and the GUI can save and load them through
//! File->Save and File->Open. The format is:
//!
//! ```yml
//! user_id: abc12345
//! hostname: ws001
//! visit_id: cm12345-1
//! authorisation_level: 1
//! request_popup_enabled: true
//! request_timeout_seconds: 120
//! accept_request_on_timeout: true
//! watchdog_enabled: false
//! watchdog_timeout_minutes: 5.0
//! watchdog_prompt_minutes: 1.0
//! watchdog_tick_millis: 1000
//! shutdown_poll_millis: 100
//! shutdown_max_wait_seconds: null
//! message_log_path: null
//! simulation:
//!   peers:
//!   - user_id: operator
//!     hostname: control-room
//!     authorisation_level: 1
//!   lease_renew_seconds: 30
//!   abort_delay_polls: 10
//! ```
//!
//! Any field left out takes the default shown above.
//!
//! ### Request popup
//!
//! When another client requests the baton, the holder sees a countdown of
//! `request_timeout_seconds`. Answering release passes the baton to the requester;
//! answering keep broadcasts "Baton request denied.". If nobody answers, the popup
//! resolves as `accept_request_on_timeout`. If the holder loses the baton some other way
//! while the popup is open, it resolves as a release at once.
//!
//! ### Renewal watchdog
//!
//! Disabled by default. When enabled, a client that has not seen a lease renewal push
//! for `watchdog_timeout_minutes` warns the user, and shuts down after a further
//! `watchdog_prompt_minutes` unless the warning is cancelled.
//!
//! ### Shutdown
//!
//! Shutting down aborts running scans and scripts, waits for both to report idle
//! (forever unless `shutdown_max_wait_seconds` is set), disconnects and exits.
pub mod baton_control;
pub mod baton_state;
pub mod client_details;
pub mod clock;
pub mod config;
pub mod console;
pub mod error;
pub mod facade;
pub mod message_log;
pub mod notification;
pub mod request_popup;
pub mod shutdown;
pub mod sim_server;
pub mod ui_event;
pub mod watchdog;
