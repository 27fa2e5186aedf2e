pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod filetree;
pub mod history;
pub mod response;
pub mod runner;
pub mod server;
pub mod session;
pub mod store;
pub mod tools;
