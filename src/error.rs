use thiserror::Error;

#[derive(Error, Debug)]
pub enum SiftError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Sheet '{sheet}' is missing a {role} column")]
    ColumnDetection { sheet: String, role: &'static str },

    #[error("Empty file: no usable sheets")]
    EmptyFile,

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SiftError>;
