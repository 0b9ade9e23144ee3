pub mod engine;
pub mod exec;
pub mod helper;
pub mod interp;
pub mod protocol;
pub mod wrapper;
