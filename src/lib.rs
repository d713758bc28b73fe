pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod http;
pub mod mappings;
pub mod normalize;
pub mod output;
pub mod registry;
pub mod retry;
pub mod transform;
pub mod visibility;
pub mod xlsx;
