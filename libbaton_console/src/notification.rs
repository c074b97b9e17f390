use super::client_details::ClientDetails;

/// The push notifications a client receives from the control server.
///
/// Each kind gets its own handler in [`crate::console::BatonConsole`]; nothing downstream
/// inspects payload types at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Someone took, released or passed the baton. Re-read the state.
    BatonChanged,
    /// Another client wants the baton we hold.
    BatonRequested { requester: ClientDetails },
    /// Server heartbeat; feeds the renewal watchdog.
    BatonLeaseRenewRequest,
    UserMessage {
        source_client_number: i32,
        source_username: String,
        message: String,
    },
}
