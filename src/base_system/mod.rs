pub mod config;
pub mod context;
pub mod item_id;
pub mod logging;
