pub mod categorizer;
pub mod columns;
pub mod convention;
pub mod db;
pub mod error;
pub mod merchant;
pub mod models;
pub mod normalizer;
pub mod settings;
pub mod sheets;
pub mod uploader;

pub use error::{Result, SiftError};
