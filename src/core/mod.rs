pub mod announce;
pub mod archive;
pub mod config;
pub mod epub;
pub mod error;
pub mod event;
pub mod model;
pub mod registry;
pub mod store;
