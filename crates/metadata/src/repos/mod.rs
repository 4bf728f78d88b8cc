//! Repository traits for metadata operations.

pub mod access;
pub mod blocks;
pub mod chunks;
pub mod commits;
pub mod marker;
pub mod projects;
pub mod tokens;

pub use access::AccessRepo;
pub use blocks::BlockRepo;
pub use chunks::ChunkRepo;
pub use commits::{CommitRepo, CommitWrite, RestoreWrite};
pub use marker::AdminMarkerRepo;
pub use projects::ProjectRepo;
pub use tokens::TokenRepo;
