pub mod cli;
pub mod config;
pub mod pinger;
pub mod probe;
