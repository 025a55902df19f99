use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    /// The control loop has exited, so nothing can be registered or delivered.
    #[error("hub is no longer running")]
    Closed,
}
