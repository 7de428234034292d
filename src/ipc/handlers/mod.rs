pub mod profile;
pub mod service;
pub mod updates;
