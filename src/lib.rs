pub mod agent;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod error;
pub mod exec;
pub mod frontend;
pub mod orchestration;
pub mod session;
