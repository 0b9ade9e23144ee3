pub mod config;
pub mod helper;
pub mod observability;
pub mod step;
