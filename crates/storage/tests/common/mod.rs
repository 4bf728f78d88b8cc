pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{blake3_hex, seeded_bytes, test_backend};
