use crate::models::{AmountConvention, ColumnMapping, ConventionDetection, ConventionSource, Sheet};
use crate::normalizer::parse_amount;
use crate::settings::Settings;

/// Resolve the sign convention for a file. An explicit override always wins;
/// the filename-issuer keyword match and the sign-majority fallback are
/// heuristic suggestions whose provenance is reported back to the caller.
pub fn detect_convention(
    sheet: &Sheet,
    mapping: ColumnMapping,
    filename: &str,
    settings: &Settings,
    override_convention: Option<AmountConvention>,
) -> ConventionDetection {
    if let Some(convention) = override_convention {
        return ConventionDetection {
            convention,
            source: ConventionSource::Override,
        };
    }

    let normalized_name: String = filename
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    for keyword in &settings.negative_issuer_keywords {
        if normalized_name.contains(keyword.as_str()) {
            return ConventionDetection {
                convention: AmountConvention::Negative,
                source: ConventionSource::FilenameKeyword {
                    keyword: keyword.clone(),
                },
            };
        }
    }

    // Statistical fallback: most statement rows are spending, so the
    // majority sign is assumed to be the spending direction.
    let mut negative = 0usize;
    let mut positive = 0usize;
    for row in &sheet.rows {
        let Some(cell) = row.get(mapping.amount) else {
            continue;
        };
        let Some(amount) = parse_amount(cell) else {
            continue;
        };
        if amount < 0.0 {
            negative += 1;
        } else if amount > 0.0 {
            positive += 1;
        }
    }

    let convention = if negative >= positive {
        AmountConvention::Negative
    } else {
        AmountConvention::Positive
    };
    ConventionDetection {
        convention,
        source: ConventionSource::SignMajority { negative, positive },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(amounts: &[&str]) -> Sheet {
        Sheet {
            name: "test".to_string(),
            headers: vec!["Date".into(), "Merchant".into(), "Amount".into()],
            rows: amounts
                .iter()
                .map(|a| vec!["01/02/2025".to_string(), "SHOP".to_string(), a.to_string()])
                .collect(),
        }
    }

    const MAPPING: ColumnMapping = ColumnMapping {
        date: 0,
        merchant: 1,
        amount: 2,
    };

    #[test]
    fn test_override_wins_over_everything() {
        let d = detect_convention(
            &sheet(&["-1.00"]),
            MAPPING,
            "chase_2025.csv",
            &Settings::default(),
            Some(AmountConvention::Positive),
        );
        assert_eq!(d.convention, AmountConvention::Positive);
        assert_eq!(d.source, ConventionSource::Override);
    }

    #[test]
    fn test_filename_keyword_match() {
        let d = detect_convention(
            &sheet(&["10.00", "20.00"]),
            MAPPING,
            "Chase-Statement Jan.csv",
            &Settings::default(),
            None,
        );
        assert_eq!(d.convention, AmountConvention::Negative);
        assert!(matches!(
            d.source,
            ConventionSource::FilenameKeyword { ref keyword } if keyword == "chase"
        ));
    }

    #[test]
    fn test_sign_majority_negative() {
        let d = detect_convention(
            &sheet(&["-5.00", "-2.50", "100.00"]),
            MAPPING,
            "statement.csv",
            &Settings::default(),
            None,
        );
        assert_eq!(d.convention, AmountConvention::Negative);
        assert_eq!(
            d.source,
            ConventionSource::SignMajority { negative: 2, positive: 1 }
        );
    }

    #[test]
    fn test_sign_majority_positive() {
        let d = detect_convention(
            &sheet(&["5.00", "2.50", "-100.00"]),
            MAPPING,
            "statement.csv",
            &Settings::default(),
            None,
        );
        assert_eq!(d.convention, AmountConvention::Positive);
    }

    #[test]
    fn test_unparseable_amounts_ignored_in_majority() {
        let d = detect_convention(
            &sheet(&["n/a", "-1.00"]),
            MAPPING,
            "statement.csv",
            &Settings::default(),
            None,
        );
        assert_eq!(
            d.source,
            ConventionSource::SignMajority { negative: 1, positive: 0 }
        );
    }
}
