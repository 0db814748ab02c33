pub mod events;
pub mod extract;
pub mod models;
pub mod poller;
pub mod predictions;
