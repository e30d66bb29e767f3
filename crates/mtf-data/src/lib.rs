//! SQLite-backed candle storage for `mtf-core`.

pub mod error;
pub mod sqlite_loader;

pub use error::DataError;
pub use sqlite_loader::SqliteCandleSource;
