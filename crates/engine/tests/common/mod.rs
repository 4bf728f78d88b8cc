pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{
    FlakyStore, TestEnv, body, change, seeded_bytes, test_env, test_env_with_storage,
};
