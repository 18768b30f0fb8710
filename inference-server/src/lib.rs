pub mod context;
pub mod handlers;
pub mod models;
pub mod scheduling;
pub mod server;
pub mod utils;
