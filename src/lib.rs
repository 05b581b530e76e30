pub mod config;
pub mod control;
pub mod driver;
pub mod gesture;
pub mod mapping;
pub mod session;
