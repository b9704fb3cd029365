use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const ROOT_ENV: &str = "DOCQA_ROOT";
const DATA_DIR_ENV: &str = "DOCQA_DATA_DIR";

/// Filesystem layout of one installation.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    /// SQLite index.
    pub db_path: PathBuf,
    /// Uploaded document bytes.
    pub documents_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = env::var_os(ROOT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_project_root);
        let user_data_dir = env::var_os(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir(&project_root));
        Self::with_data_dir(project_root, user_data_dir)
    }

    /// Lay out every derived path under an explicit data directory.
    pub fn with_data_dir(project_root: PathBuf, user_data_dir: PathBuf) -> Self {
        let paths = AppPaths {
            log_dir: user_data_dir.join("logs"),
            db_path: user_data_dir.join("docqa.db"),
            documents_dir: user_data_dir.join("documents"),
            project_root,
            user_data_dir,
        };

        for dir in [&paths.user_data_dir, &paths.log_dir, &paths.documents_dir] {
            if let Err(e) = fs::create_dir_all(dir) {
                tracing::warn!("Could not create {}: {}", dir.display(), e);
            }
        }
        paths
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

/// The crate directory when it carries a config file, else the working directory.
fn default_project_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("config.yml").is_file() {
        return manifest_dir;
    }
    env::current_dir().unwrap_or(manifest_dir)
}

/// Debug builds keep data next to the project; release builds use the
/// platform's per-user data location.
fn default_data_dir(project_root: &Path) -> PathBuf {
    if cfg!(debug_assertions) {
        return project_root.to_path_buf();
    }

    match env::consts::OS {
        "windows" => env::var_os("LOCALAPPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(home_dir)
            .join("DocQA"),
        "macos" => home_dir().join("Library/Application Support/DocQA"),
        _ => env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home_dir().join(".local/share"))
            .join("docqa"),
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
