//! novel-harvest: 网络小说章节发现与增量下载

pub mod core;
pub mod engine;
pub mod interfaces;
pub mod network;
pub mod sites;
pub mod ui;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
