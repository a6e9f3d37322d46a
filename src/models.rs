use serde::{Deserialize, Serialize};

/// Per-file rule mapping signed raw amounts to spending vs. credit.
/// Fixed once per upload and attached to every row derived from that file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountConvention {
    /// Negative raw amount means spending (most card exports).
    Negative,
    /// Positive raw amount means spending.
    Positive,
}

impl AmountConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Positive => "positive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "negative" => Some(Self::Negative),
            "positive" => Some(Self::Positive),
            _ => None,
        }
    }

    /// Non-negative derived spending value for a raw amount under this
    /// convention. Zero means the row is a credit (or a payment, which the
    /// caller decides separately).
    pub fn spending(&self, amount_raw: f64) -> f64 {
        match self {
            Self::Negative if amount_raw < 0.0 => -amount_raw,
            Self::Positive if amount_raw > 0.0 => amount_raw,
            _ => 0.0,
        }
    }

    pub fn is_credit(&self, amount_raw: f64) -> bool {
        self.spending(amount_raw) == 0.0
    }
}

/// How the convention for a file was decided. Surfaced to the caller so the
/// filename heuristic stays a suggestion rather than a silent decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConventionSource {
    /// Caller supplied the convention explicitly.
    Override,
    /// Filename matched an issuer known to export negative-for-spend.
    FilenameKeyword { keyword: String },
    /// Inferred from the sign distribution of the amount column.
    SignMajority { negative: usize, positive: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct ConventionDetection {
    pub convention: AmountConvention,
    pub source: ConventionSource,
}

/// One parsed sheet of a statement export, before any interpretation.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Resolved semantic roles for a sheet's columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMapping {
    pub date: usize,
    pub merchant: usize,
    pub amount: usize,
}

/// Intermediate representation of a valid row. The raw amount keeps its
/// source sign untouched; the convention is applied only at persist time.
#[derive(Debug, Clone)]
pub struct NormalizedTransaction {
    pub date: String,
    pub merchant_raw: String,
    pub merchant: String,
    pub amount_raw: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    DateParse,
    AmountParse,
    Payment,
    CreditCardPayment,
    Other,
}

impl ErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DateParse => "date_parse",
            Self::AmountParse => "amount_parse",
            Self::Payment => "payment",
            Self::CreditCardPayment => "credit_card_payment",
            Self::Other => "other",
        }
    }

    /// Payments are expected exclusions, not defects; everything else is a
    /// fixable failure that becomes a review placeholder.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Payment | Self::CreditCardPayment)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub sheet: String,
    /// 1-based data row index within the sheet.
    pub row: usize,
    pub reason: ErrorReason,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Approved,
    PendingReview,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::PendingReview => "pending_review",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(Self::Approved),
            "pending_review" => Some(Self::PendingReview),
            _ => None,
        }
    }
}

/// Persisted transaction row. Spending is derived once, at write time, from
/// the raw amount and the owning file's convention.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub id: Option<i64>,
    pub user_id: String,
    pub source_file_hash: String,
    pub date: Option<String>,
    pub merchant_raw: String,
    pub merchant: String,
    pub amount_raw: Option<f64>,
    pub amount_spending: f64,
    pub amount_convention: AmountConvention,
    pub is_credit: bool,
    pub is_payment: bool,
    pub category: Option<String>,
    pub confidence: Option<f64>,
    pub status: Status,
    pub import_error_reason: Option<String>,
    pub import_error_message: Option<String>,
    pub notes: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: Option<i64>,
    pub file_hash: String,
    pub user_id: String,
    pub filename: String,
    pub uploaded_at: Option<String>,
    pub amount_convention: AmountConvention,
}

/// Merchant-to-category rule, walked in priority order.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: Option<i64>,
    pub pattern: String,
    pub match_type: String,
    pub category: String,
    /// Issuer the rule was learned from, if any. Used to scope
    /// cross-institution previews.
    pub institution: Option<String>,
    pub priority: i64,
    pub hit_count: i64,
    pub is_active: bool,
}

/// Category decision for one transaction.
#[derive(Debug, Clone)]
pub struct CategoryAssignment {
    pub category: Option<String>,
    pub confidence: f64,
    pub status: Status,
    /// Rule that matched directly, for hit accounting. None for similarity
    /// fallback and unmatched merchants.
    pub rule_id: Option<i64>,
}

/// Proposed category from the cross-institution classifier. Never applied
/// automatically; the caller must commit it explicitly.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryPreview {
    pub transaction_id: i64,
    pub merchant: String,
    pub category: String,
    pub confidence: f64,
}

/// Per-file outcome of an upload. Always complete: row errors, counts and
/// the convention actually used are reported even on failure.
#[derive(Debug, Clone, Serialize)]
pub struct FileUploadResult {
    pub filename: String,
    pub success: bool,
    pub duplicate: bool,
    /// Post-commit verification disagreed with the expected aggregate. The
    /// data stays committed; the file needs manual review.
    pub integrity_mismatch: bool,
    pub message: String,
    pub transaction_count: usize,
    pub spending_count: usize,
    pub credit_count: usize,
    pub payment_count: usize,
    pub error_count: usize,
    pub total_spending: f64,
    pub convention: Option<AmountConvention>,
    pub convention_source: Option<ConventionSource>,
    pub errors: Vec<RowError>,
}

impl FileUploadResult {
    pub fn failed(filename: &str, message: String) -> Self {
        Self {
            filename: filename.to_string(),
            success: false,
            duplicate: false,
            integrity_mismatch: false,
            message,
            transaction_count: 0,
            spending_count: 0,
            credit_count: 0,
            payment_count: 0,
            error_count: 0,
            total_spending: 0.0,
            convention: None,
            convention_source: None,
            errors: Vec::new(),
        }
    }
}

/// Aggregate outcome of a multi-file upload. One file's failure never
/// affects its siblings.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub files: Vec<FileUploadResult>,
    pub succeeded: usize,
    pub failed: usize,
}
