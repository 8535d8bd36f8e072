use std::path::PathBuf;
use std::sync::OnceLock;

static BASE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the base directory for all input/output, the current working
/// directory by default.
pub fn get_base_dir() -> &'static PathBuf {
    BASE_DIR.get_or_init(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Returns the screenshots directory: `<base>/screenshots/`
///
/// The upstream capture job deposits one image per machine per day here,
/// under a `YYYY-MM-DD` subdirectory.
pub fn get_screenshots_dir() -> PathBuf {
    get_base_dir().join("screenshots")
}

/// Returns the data directory: `<base>/data/`
pub fn get_data_dir() -> PathBuf {
    get_base_dir().join("data")
}

/// Returns the logs directory: `<base>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_base_dir().join("logs")
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_data_dir())?;
    std::fs::create_dir_all(get_logs_dir())?;
    Ok(())
}
