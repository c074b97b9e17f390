/// Snapshot of one client session as reported by the control server.
///
/// Fetched on every refresh and never mutated locally; the server is the only authority
/// on `has_baton`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientDetails {
    pub index: i32,
    pub user_id: String,
    pub hostname: String,
    pub visit_id: String,
    pub authorisation_level: i32,
    pub has_baton: bool,
}

impl ClientDetails {
    pub fn new(
        index: i32,
        user_id: &str,
        hostname: &str,
        visit_id: &str,
        authorisation_level: i32,
    ) -> Self {
        Self {
            index,
            user_id: user_id.to_string(),
            hostname: hostname.to_string(),
            visit_id: visit_id.to_string(),
            authorisation_level,
            has_baton: false,
        }
    }

    /// Human readable one-liner, e.g. `abc123 on ws001 (client #2)`
    pub fn describe(&self) -> String {
        format!("{} on {} (client #{})", self.user_id, self.hostname, self.index)
    }
}
