pub mod add;
pub mod car;
pub mod common;
pub mod completions;
pub mod config;
pub mod delete;
pub mod export;
pub mod list;
pub mod price;
pub mod reminders;
pub mod sync;
pub mod usage;
