use thiserror::Error;

/// The "session" kind of the error taxonomy as it applies to the
/// connection/identity layer (§7).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection is not registered")]
    UnknownConnection,

    #[error("player is not currently connected")]
    NotConnected,

    #[error("connection could not be authenticated")]
    Unauthenticated,
}
