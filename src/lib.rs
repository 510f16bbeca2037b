/// GigHub backend: push notifications for chats and raves, rating
/// aggregation and expired content cleanup over a JSON document store.

pub mod config;
pub mod db;
pub mod error;
pub mod functions;
pub mod geo;
pub mod handlers;
pub mod messaging;
pub mod scheduler;
pub mod server;
pub mod triggers;
