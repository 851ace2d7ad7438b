pub mod history;
pub mod models;

pub use history::{HistoryService, HistoryStore, load_backlog};
pub use models::{BroadcastPost, HistoryRecord};
