//! Network layer: the reconnecting websocket transport and its idle
//! watchdog.

pub mod transport;
mod watchdog;

pub use transport::{ConnectionState, SessionProvider, Transport, TransportEvent};
