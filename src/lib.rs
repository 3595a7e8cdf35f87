pub mod commands;
pub mod error;
pub mod link;
pub mod manifest;
pub mod model;
pub mod registry;
pub mod runtime;
