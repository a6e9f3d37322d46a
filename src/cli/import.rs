use colored::Colorize;

use sift::db::get_connection;
use sift::models::AmountConvention;
use sift::settings::{get_data_dir, load_settings};
use sift::uploader::{upload_files, UploadFile};
use sift::{Result, SiftError};

pub fn run(files: &[String], user: &str, convention: Option<&str>, json: bool) -> Result<()> {
    let convention = match convention {
        Some(s) => Some(
            AmountConvention::from_str(s)
                .ok_or_else(|| SiftError::Other(format!("unknown convention '{s}'")))?,
        ),
        None => None,
    };

    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        let content = std::fs::read(path)?;
        let filename = path.rsplit('/').next().unwrap_or(path).to_string();
        uploads.push(UploadFile {
            filename,
            content,
            convention,
        });
    }

    let settings = load_settings();
    let conn = get_connection(&get_data_dir().join("sift.db"))?;
    sift::db::init_db(&conn)?;

    let result = upload_files(&conn, &settings, user, &uploads);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result)
                .map_err(|e| SiftError::Other(e.to_string()))?
        );
        return Ok(());
    }

    for file in &result.files {
        let marker = if file.success {
            "ok".green()
        } else if file.duplicate {
            "duplicate".yellow()
        } else {
            "failed".red()
        };
        println!("[{marker}] {}: {}", file.filename, file.message);
        if let (Some(convention), Some(source)) = (&file.convention, &file.convention_source) {
            println!("    convention: {} ({source:?})", convention.as_str());
        }
        for err in &file.errors {
            println!(
                "    {}:{} {} - {}",
                err.sheet,
                err.row,
                err.reason.as_str(),
                err.message
            );
        }
        if file.success {
            println!(
                "    {} transactions, total spending ${:.2}",
                file.transaction_count, file.total_spending
            );
        }
    }
    println!("{} succeeded, {} failed", result.succeeded, result.failed);
    Ok(())
}
