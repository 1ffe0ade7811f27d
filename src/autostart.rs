//! Start-with-session support via an XDG autostart entry
//!
//! Desktop environments implementing XDG autostart launch every
//! `*.desktop` file in `~/.config/autostart/` at login.

use std::fs;
use std::path::{Path, PathBuf};

const ENTRY_FILE_NAME: &str = "gammakey.desktop";

/// Get the path to the autostart directory (~/.config/autostart)
fn autostart_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("autostart"))
}

fn desktop_entry(exec: &Path) -> String {
    format!(
        "[Desktop Entry]\n\
         Type=Application\n\
         Name=GammaKey\n\
         Comment=Hotkey display gamma toggle\n\
         Exec=\"{}\"\n\
         Terminal=false\n\
         X-GNOME-Autostart-enabled=true\n",
        exec.display()
    )
}

/// Create or remove the entry in `dir`.
///
/// Returns whether anything on disk changed.
pub fn sync_in(dir: &Path, enabled: bool, exec: &Path) -> Result<bool, String> {
    let path = dir.join(ENTRY_FILE_NAME);

    if enabled {
        let contents = desktop_entry(exec);
        if fs::read_to_string(&path).ok().as_deref() == Some(contents.as_str()) {
            return Ok(false);
        }
        fs::create_dir_all(dir)
            .map_err(|e| format!("Failed to create autostart directory {:?}: {}", dir, e))?;
        fs::write(&path, contents)
            .map_err(|e| format!("Failed to write autostart entry {:?}: {}", path, e))?;
        log::info!("Autostart enabled ({:?})", path);
        Ok(true)
    } else {
        match fs::remove_file(&path) {
            Ok(()) => {
                log::info!("Autostart disabled (removed {:?})", path);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(format!("Failed to remove autostart entry {:?}: {}", path, e)),
        }
    }
}

pub fn is_enabled_in(dir: &Path) -> bool {
    dir.join(ENTRY_FILE_NAME).exists()
}

/// Make the user's autostart entry match `enabled`, pointing at this binary.
pub fn sync(enabled: bool) -> Result<bool, String> {
    let dir = autostart_dir().ok_or("Could not determine config directory")?;
    let exec = std::env::current_exe()
        .map_err(|e| format!("Failed to resolve current executable: {}", e))?;
    sync_in(&dir, enabled, &exec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_enable_writes_entry_once() {
        let dir = TempDir::new().unwrap();
        let autostart = dir.path().join("autostart");
        let exec = Path::new("/usr/local/bin/gammakey");

        assert!(sync_in(&autostart, true, exec).unwrap());
        assert!(is_enabled_in(&autostart));
        let contents = fs::read_to_string(autostart.join(ENTRY_FILE_NAME)).unwrap();
        assert!(contents.contains("Exec=\"/usr/local/bin/gammakey\""));

        // Unchanged entry is left alone
        assert!(!sync_in(&autostart, true, exec).unwrap());
    }

    #[test]
    fn test_disable_removes_entry() {
        let dir = TempDir::new().unwrap();
        let exec = Path::new("/opt/gammakey");

        assert!(!sync_in(dir.path(), false, exec).unwrap());
        sync_in(dir.path(), true, exec).unwrap();
        assert!(sync_in(dir.path(), false, exec).unwrap());
        assert!(!is_enabled_in(dir.path()));
    }
}
