use sift::db::{delete_orphaned_source_files, get_connection, init_db};
use sift::settings::get_data_dir;
use sift::Result;

pub fn run() -> Result<()> {
    let conn = get_connection(&get_data_dir().join("sift.db"))?;
    init_db(&conn)?;
    let deleted = delete_orphaned_source_files(&conn)?;
    if deleted == 0 {
        println!("No orphaned source files.");
    } else {
        println!("Deleted {deleted} orphaned source file(s).");
    }
    Ok(())
}
