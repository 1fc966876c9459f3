use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Malaria Epidemiological Analyzer";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Footer lines printed on every generated report page.
pub const COPYRIGHT: &str = "All rights reserved © Dr. Mohammed Elnagi Mohammed";
pub const DEDICATION_TEXT: &str =
    "Dedicated to the health professionals serving in endemic areas.";

/// Default `RUST_LOG` filter when the environment sets none.
pub fn default_log_filter() -> &'static str {
    "epiform_lib=info,epiform=info"
}

/// Application data directory, `~/Epiform/`. `None` when the home directory
/// cannot be determined.
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("Epiform"))
}

/// Where exports go when no output directory is given: the user's documents
/// folder, else the app data directory, else the working directory.
pub fn default_output_dir() -> PathBuf {
    dirs::document_dir()
        .map(|d| d.join("Epiform"))
        .or_else(app_data_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Default configuration file location, `~/Epiform/epiform.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join("epiform.toml"))
}
