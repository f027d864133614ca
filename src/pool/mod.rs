mod manager;

pub use manager::{connect, create_pool};

#[cfg(test)]
pub(crate) use manager::test_pool;
