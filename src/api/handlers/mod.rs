pub mod config;
pub mod downloads;
pub mod health;
pub mod proxy;
pub mod users;
