// Web directory resolution for the bundled frontend

use std::path::{Path, PathBuf};

const WEB_DIR_NAME: &str = "static";

/// Pick the directory holding index.html and assets/.
///
/// Order: explicit configuration, `static/` next to the executable,
/// `static/` in the working directory.
pub fn resolve_web_dir(configured: Option<&Path>) -> PathBuf {
    if let Some(dir) = configured {
        return dir.to_path_buf();
    }

    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(WEB_DIR_NAME)));
    resolve_from(beside_exe, PathBuf::from(WEB_DIR_NAME))
}

fn resolve_from(beside_exe: Option<PathBuf>, fallback: PathBuf) -> PathBuf {
    match beside_exe {
        Some(dir) if dir.is_dir() => dir,
        _ => fallback,
    }
}
