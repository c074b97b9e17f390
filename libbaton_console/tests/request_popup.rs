mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{requester, Call, RecordingFacade};
use libbaton_console::clock::ManualClock;
use libbaton_console::facade::ControlFacade;
use libbaton_console::request_popup::{
    PendingRequest, PopupHandle, PopupOutcome, PopupState, RequestGuard, DENIED_MESSAGE,
};
use libbaton_console::sim_server::SimulatedServer;
use libbaton_console::ui_event::{ui_channel, UiEvent};

fn open(
    facade: &Arc<RecordingFacade>,
    timeout_seconds: u64,
    auto_accept_on_timeout: bool,
) -> (PopupHandle, RequestGuard, std::sync::mpsc::Receiver<UiEvent>) {
    let (ui, rx) = ui_channel();
    let guard = RequestGuard::new();
    assert!(guard.try_acquire());
    let handle = PopupHandle::new(
        PendingRequest {
            requester: requester(),
            timeout_seconds,
            auto_accept_on_timeout,
        },
        facade.clone(),
        ui,
        guard.clone(),
    );
    (handle, guard, rx)
}

#[test]
fn unanswered_request_is_denied_once_at_timeout() {
    let facade = Arc::new(RecordingFacade::new());
    let clock = ManualClock::new();
    let (handle, guard, rx) = open(&facade, 5, false);

    handle.run_countdown(&clock);

    assert_eq!(clock.elapsed(), Duration::from_secs(5));
    assert_eq!(
        facade.count(&Call::SendMessage(DENIED_MESSAGE.to_string())),
        1
    );
    assert_eq!(facade.count(&Call::AssignBaton(7)), 0);
    assert!(!guard.is_active());

    let events: Vec<UiEvent> = rx.try_iter().collect();
    let countdown: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            UiEvent::RequestPending {
                seconds_remaining, ..
            } => Some(*seconds_remaining),
            _ => None,
        })
        .collect();
    assert_eq!(countdown, vec![5, 4, 3, 2, 1]);
    assert_eq!(
        events.last(),
        Some(&UiEvent::RequestResolved {
            requester: requester(),
            outcome: PopupOutcome::TimedOut { accepted: false }
        })
    );
}

#[test]
fn unanswered_request_is_accepted_when_configured() {
    let facade = Arc::new(RecordingFacade::new());
    let clock = ManualClock::new();
    let (handle, _guard, _rx) = open(&facade, 5, true);

    handle.run_countdown(&clock);

    assert_eq!(clock.elapsed(), Duration::from_secs(5));
    assert_eq!(facade.count(&Call::AssignBaton(7)), 1);
    assert_eq!(
        facade.count(&Call::SendMessage(DENIED_MESSAGE.to_string())),
        0
    );
}

#[test]
fn losing_the_baton_resolves_affirmatively_at_once() {
    // Still holder for the first two checks, gone on the third
    let facade = Arc::new(RecordingFacade::losing_baton_after(2));
    let clock = ManualClock::new();
    let (handle, guard, _rx) = open(&facade, 120, false);

    handle.run_countdown(&clock);

    assert_eq!(clock.elapsed(), Duration::from_secs(2));
    assert_eq!(
        handle.state(),
        PopupState::Resolved(PopupOutcome::HolderLost)
    );
    assert_eq!(facade.count(&Call::AssignBaton(7)), 1);
    assert_eq!(
        facade.count(&Call::SendMessage(DENIED_MESSAGE.to_string())),
        0
    );
    assert!(!guard.is_active());
}

#[test]
fn answer_before_timeout_wins_and_countdown_stops() {
    let facade = Arc::new(RecordingFacade::new());
    let clock = ManualClock::new();
    let (handle, _guard, _rx) = open(&facade, 120, true);

    assert_eq!(handle.answer(false), Some(PopupOutcome::Kept));
    assert_eq!(handle.answer(true), None);
    handle.run_countdown(&clock);

    assert_eq!(clock.elapsed(), Duration::ZERO);
    assert_eq!(
        facade.count(&Call::SendMessage(DENIED_MESSAGE.to_string())),
        1
    );
    assert_eq!(facade.count(&Call::AssignBaton(7)), 0);
}

#[test]
fn concurrent_answer_and_countdown_call_facade_once() {
    let facade = Arc::new(RecordingFacade::new());
    let (handle, _guard, _rx) = open(&facade, 1, true);
    let countdown = handle.clone();
    let worker = std::thread::spawn(move || {
        let clock = ManualClock::new();
        countdown.run_countdown(&clock);
    });
    handle.answer(true);
    worker.join().unwrap();

    assert_eq!(facade.count(&Call::AssignBaton(7)), 1);
}

#[test]
fn losing_the_baton_in_the_last_second_still_releases() {
    // Holder at the start and after each of the first four ticks, gone before the fifth
    let facade = Arc::new(RecordingFacade::losing_baton_after(5));
    let clock = ManualClock::new();
    let (handle, guard, _rx) = open(&facade, 5, false);

    handle.run_countdown(&clock);

    assert_eq!(clock.elapsed(), Duration::from_secs(5));
    assert_eq!(
        handle.state(),
        PopupState::Resolved(PopupOutcome::HolderLost)
    );
    assert_eq!(facade.count(&Call::AssignBaton(7)), 1);
    assert_eq!(
        facade.count(&Call::SendMessage(DENIED_MESSAGE.to_string())),
        0
    );
    assert!(!guard.is_active());
}

#[test]
fn release_from_the_panel_closes_the_popup_without_a_notice() {
    let server = SimulatedServer::new();
    let (alice, _alice_rx) = server.connect("alice", "ws1", "cm1-1", 1);
    let (bob, _bob_rx) = server.connect("bob", "ws2", "cm1-1", 1);
    alice.take_baton().unwrap();
    assert!(bob.request_baton().unwrap());

    let (ui, rx) = ui_channel();
    let guard = RequestGuard::new();
    assert!(guard.try_acquire());
    let handle = PopupHandle::new(
        PendingRequest {
            requester: bob.get_my_details().unwrap(),
            timeout_seconds: 120,
            auto_accept_on_timeout: false,
        },
        Arc::new(alice.clone()),
        ui,
        guard.clone(),
    );

    // Released through the main panel, the queued requester is served by the server
    alice.return_baton().unwrap();
    handle.run_countdown(&ManualClock::new());

    assert_eq!(
        handle.state(),
        PopupState::Resolved(PopupOutcome::HolderLost)
    );
    assert!(bob.am_i_baton_holder().unwrap());
    let events: Vec<UiEvent> = rx.try_iter().collect();
    assert!(!events.iter().any(|e| matches!(e, UiEvent::Notice(_))));
    assert!(matches!(
        events.last(),
        Some(UiEvent::RequestResolved {
            outcome: PopupOutcome::HolderLost,
            ..
        })
    ));
    assert!(!guard.is_active());
}
