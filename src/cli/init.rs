use sift::db::{get_connection, init_db};
use sift::settings::{load_settings, save_settings};
use sift::Result;

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = dir;
    }
    std::fs::create_dir_all(&settings.data_dir)?;
    save_settings(&settings)?;

    let db_path = std::path::Path::new(&settings.data_dir).join("sift.db");
    let conn = get_connection(&db_path)?;
    init_db(&conn)?;

    println!("Initialized database at {}", db_path.display());
    Ok(())
}
