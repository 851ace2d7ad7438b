pub mod client;
pub mod hub;
pub mod protocol;
pub mod transport;

pub use client::ChatClient;
pub use hub::{HubConnection, HubConnector, HubEvent, HubSession, HubState};
pub use transport::{HubOptions, SignalRConnector};
