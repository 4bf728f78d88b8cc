//! HTTP request handlers.

pub mod admin;
pub mod blocks;
pub mod commits;
pub mod common;
pub mod health;
pub mod projects;
pub mod snapshots;

pub use admin::*;
pub use blocks::*;
pub use commits::*;
pub use common::*;
pub use health::*;
pub use projects::*;
pub use snapshots::*;
