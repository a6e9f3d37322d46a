use sift::db::{add_rule, get_connection, init_db, load_rules};
use sift::models::Rule;
use sift::settings::get_data_dir;
use sift::Result;

pub fn add(
    pattern: &str,
    category: &str,
    match_type: &str,
    institution: Option<&str>,
    priority: i64,
) -> Result<()> {
    let conn = get_connection(&get_data_dir().join("sift.db"))?;
    init_db(&conn)?;
    add_rule(
        &conn,
        &Rule {
            id: None,
            pattern: pattern.to_string(),
            match_type: match_type.to_string(),
            category: category.to_string(),
            institution: institution.map(String::from),
            priority,
            hit_count: 0,
            is_active: true,
        },
    )?;
    println!("Added rule: '{pattern}' \u{2192} {category}");
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = get_connection(&get_data_dir().join("sift.db"))?;
    init_db(&conn)?;
    let rules = load_rules(&conn)?;
    if rules.is_empty() {
        println!("No rules yet. Add one with `sift rules add`.");
        return Ok(());
    }
    println!("{:<4} {:<30} {:<10} {:<20} {:<12} {:>8} {:>5}",
        "ID", "Pattern", "Type", "Category", "Institution", "Priority", "Hits");
    for r in rules {
        println!(
            "{:<4} {:<30} {:<10} {:<20} {:<12} {:>8} {:>5}",
            r.id.unwrap_or(0),
            r.pattern,
            r.match_type,
            r.category,
            r.institution.unwrap_or_default(),
            r.priority,
            r.hit_count
        );
    }
    Ok(())
}
