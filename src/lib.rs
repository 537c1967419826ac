pub mod address;
pub mod adapter;
pub mod config;
pub mod disasm;
pub mod error;
pub mod image;
pub mod launch;
pub mod log;
pub mod nav;
pub mod register;
pub mod session;
