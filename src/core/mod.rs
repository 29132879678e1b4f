pub mod config;
pub mod document;
pub mod notation;
pub mod project;
