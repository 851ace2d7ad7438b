//! Private and broadcast chat client for a realtime chat hub.
//!
//! The network task ([`network::ChatClient`]) owns the hub session and the
//! message sequence; the egui front-end in [`ui`] talks to it over channels.

pub mod common;
pub mod config;
pub mod error;
pub mod network;
pub mod storage;
pub mod ui;
