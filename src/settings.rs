use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiftError};

/// Tunable ingestion policy. Every threshold and keyword list the pipeline
/// consults lives here rather than being hard-coded at a call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    /// Minimum confidence for a categorized transaction to be auto-approved.
    #[serde(default = "default_approval_threshold")]
    pub approval_threshold: f64,
    /// Minimum confidence for a cross-institution category preview.
    #[serde(default = "default_preview_threshold")]
    pub preview_threshold: f64,
    /// Allowed drift between expected and persisted spending sums.
    #[serde(default = "default_integrity_epsilon")]
    pub integrity_epsilon: f64,
    #[serde(default = "default_merchant_max_len")]
    pub merchant_max_len: usize,
    /// Merchant keywords that mark a row as a payment (benign exclusion).
    #[serde(default = "default_payment_keywords")]
    pub payment_keywords: Vec<String>,
    /// Subset of payment patterns specific to credit-card payments.
    #[serde(default = "default_credit_card_payment_keywords")]
    pub credit_card_payment_keywords: Vec<String>,
    /// Filename keywords for issuers known to export negative-for-spend.
    #[serde(default = "default_negative_issuer_keywords")]
    pub negative_issuer_keywords: Vec<String>,
}

fn default_approval_threshold() -> f64 {
    0.75
}

fn default_preview_threshold() -> f64 {
    0.6
}

fn default_integrity_epsilon() -> f64 {
    0.01
}

fn default_merchant_max_len() -> usize {
    120
}

fn default_payment_keywords() -> Vec<String> {
    ["PAYMENT", "AUTOPAY", "THANK YOU", "ONLINE PMT", "DIRECTPAY", "E-PAYMENT"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_credit_card_payment_keywords() -> Vec<String> {
    ["CREDIT CARD PAYMENT", "CARD PAYMENT", "CRCARDPMT"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_negative_issuer_keywords() -> Vec<String> {
    ["chase", "amex", "american_express", "capital_one", "citi", "discover"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            approval_threshold: default_approval_threshold(),
            preview_threshold: default_preview_threshold(),
            integrity_epsilon: default_integrity_epsilon(),
            merchant_max_len: default_merchant_max_len(),
            payment_keywords: default_payment_keywords(),
            credit_card_payment_keywords: default_credit_card_payment_keywords(),
            negative_issuer_keywords: default_negative_issuer_keywords(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("sift")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("sift")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| SiftError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn get_data_dir() -> PathBuf {
    PathBuf::from(&load_settings().data_dir)
}
