use sift::db::{get_connection, stats};
use sift::settings::load_settings;
use sift::Result;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = std::path::PathBuf::from(&settings.data_dir);
    let db_path = data_dir.join("sift.db");

    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());

    if db_path.exists() {
        let conn = get_connection(&db_path)?;
        let s = stats(&conn)?;
        println!();
        println!("Source files:    {}", s.file_count);
        println!("Transactions:    {}", s.transaction_count);
        println!("Approved:        {}", s.approved);
        println!("Pending review:  {}", s.pending_review);
        println!("Total spending:  ${:.2}", s.total_spending);
    } else {
        println!();
        println!("Database not found. Run `sift init` to set up.");
    }

    Ok(())
}
