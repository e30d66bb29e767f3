use std::path::PathBuf;

use mtf_core::error::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("no candle database configured")]
    NoDatabase,

    #[error("cannot open candle database {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("candle database {path:?} has no `candles` table")]
    MissingTable { path: PathBuf },

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<DataError> for CoreError {
    fn from(e: DataError) -> Self {
        CoreError::source(e.to_string())
    }
}
