// Server module - TCP server, sessions and shared state

pub mod config;
pub mod connection;
pub mod listener;
pub mod session;
pub mod shared;

pub use config::ServerConfig;
pub use connection::Connection;
pub use listener::CinnabarServer;
pub use session::Session;
pub use shared::Shared;
