pub mod channel;
pub mod config;
pub mod flow;
pub mod logger;
pub mod schema;
pub mod state;
