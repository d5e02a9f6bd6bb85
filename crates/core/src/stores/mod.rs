#[cfg(test)]
pub(crate) mod memory;
pub mod postgres;

pub use postgres::{PgConfig, PgSession};
