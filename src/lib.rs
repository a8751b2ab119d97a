pub mod authenticator;
pub mod config;
pub mod error;
pub mod extract;
pub mod host;
pub mod surface;
