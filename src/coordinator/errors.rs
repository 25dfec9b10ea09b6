use thiserror::Error;

/// Raised when a Room's action queue is at capacity (§4.5, §5: the bounded
/// FIFO backstop against a single misbehaving or overloaded Room starving
/// the rest of the process).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("room action queue is full")]
    RoomOverloaded,
}
