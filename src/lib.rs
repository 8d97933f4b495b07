pub mod config;
pub mod error;
pub mod vocab;
pub mod preprocessing;
pub mod models;
pub mod decoding;
pub mod state;
pub mod interface;
pub mod commands;
pub mod server;
pub mod client;
