pub mod app;
pub mod colors;
pub mod components;
pub mod state;

pub use app::ChatApp;
pub use state::{AppState, ConnectForm};
