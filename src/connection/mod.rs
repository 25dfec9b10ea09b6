//! ConnectionRegistry: the bidirectional mapping between live duplex
//! connections and logical Players (§4.4).

mod errors;
mod registry;

pub use errors::RegistryError;
pub use registry::{ConnectionEvent, ConnectionId, ConnectionRegistry};
