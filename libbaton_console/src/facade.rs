use super::client_details::ClientDetails;
use super::error::FacadeError;

/// Busy/idle status of the server's scan and script queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandStatus {
    #[default]
    Idle,
    Running,
    Paused,
}

impl CommandStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Outbound calls to the command/control server.
///
/// The server is the sole authority on who holds the baton; implementors only forward
/// calls. Every method may fail with a [`FacadeError`], and callers in this crate log
/// and report such failures rather than retrying.
pub trait ControlFacade: Send + Sync {
    fn is_baton_held(&self) -> Result<bool, FacadeError>;

    fn am_i_baton_holder(&self) -> Result<bool, FacadeError>;

    /// Details of the current holder, None if nobody holds the baton
    fn get_baton_holder(&self) -> Result<Option<ClientDetails>, FacadeError>;

    /// Every connected client except this one
    fn get_other_client_information(&self) -> Result<Vec<ClientDetails>, FacadeError>;

    fn get_my_details(&self) -> Result<ClientDetails, FacadeError>;

    /// Queue a request for the baton. Returns false if a request from this client is
    /// already queued.
    fn request_baton(&self) -> Result<bool, FacadeError>;

    /// Take the baton without asking. Refused when the holder outranks this client.
    fn take_baton(&self) -> Result<(), FacadeError>;

    fn return_baton(&self) -> Result<(), FacadeError>;

    fn assign_baton(&self, client_index: i32) -> Result<(), FacadeError>;

    fn send_message(&self, text: &str) -> Result<(), FacadeError>;

    fn get_scan_status(&self) -> Result<CommandStatus, FacadeError>;

    fn get_script_status(&self) -> Result<CommandStatus, FacadeError>;

    /// Ask the server to stop running scans and scripts. Returns immediately.
    fn abort_commands(&self) -> Result<(), FacadeError>;

    /// Drop the connection to the server
    fn disconnect(&self) -> Result<(), FacadeError>;
}
