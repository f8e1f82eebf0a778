pub mod cli;
pub mod config;
pub mod control;
pub mod mapper;
pub mod media;
pub mod mode;
pub mod operator;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod status;
pub mod throttle;
pub mod tls;
