// Redamancy client - Library root

pub mod account;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http_client;
pub mod url;
