use sift::categorizer::{apply_previews, preview_cross_institution};
use sift::db::{get_connection, init_db};
use sift::settings::{get_data_dir, load_settings};
use sift::Result;

pub fn run(user: &str, institution: &str, apply: bool) -> Result<()> {
    let settings = load_settings();
    let conn = get_connection(&get_data_dir().join("sift.db"))?;
    init_db(&conn)?;

    let previews = preview_cross_institution(&conn, user, institution, &settings)?;
    if previews.is_empty() {
        println!("No cross-institution proposals.");
        return Ok(());
    }

    for p in &previews {
        println!(
            "#{} {:<40} \u{2192} {} ({:.0}%)",
            p.transaction_id,
            p.merchant,
            p.category,
            p.confidence * 100.0
        );
    }

    if apply {
        let applied = apply_previews(&conn, &previews, &settings)?;
        println!("Applied {applied} proposal(s).");
    } else {
        println!("{} proposal(s). Re-run with --apply to commit.", previews.len());
    }
    Ok(())
}
