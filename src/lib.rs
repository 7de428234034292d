pub mod autostart;
pub mod command_builder;
pub mod config;
pub mod ipc;
pub mod process_monitor;
pub mod service;
pub mod shutdown;
pub mod supervisor;
pub mod updater;
pub mod utils;
