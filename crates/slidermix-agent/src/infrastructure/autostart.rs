//! Start the agent at login.
//!
//! Each platform has its own per-user mechanism:
//! - Linux:   an XDG autostart entry, `~/.config/autostart/slidermix.desktop`
//! - macOS:   a LaunchAgent, `~/Library/LaunchAgents/com.slidermix.agent.plist`
//! - Windows: a shortcut in the user's Startup folder, `SliderMix.lnk`
//!
//! [`Autostart`] owns the directory the entry lives in, so tests point it at a
//! temporary directory instead of the real home.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

/// Application name shown in desktop entries and the Startup folder.
pub const APP_NAME: &str = "SliderMix";
/// launchd label of the macOS LaunchAgent.
pub const LAUNCH_AGENT_LABEL: &str = "com.slidermix.agent";

/// Error type for autostart registration.
#[derive(Debug, Error)]
pub enum AutostartError {
    /// The per-user autostart directory could not be determined.
    #[error("could not determine the autostart directory for this platform")]
    NoAutostartDir,

    #[error("I/O error accessing autostart entry at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The Windows shell refused to create the shortcut.
    #[error("failed to create startup shortcut: {0}")]
    Shortcut(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Desktop,
    LaunchAgent,
    #[cfg(target_os = "windows")]
    Shortcut,
}

/// A login-time entry for the agent in one directory.
#[derive(Debug, Clone)]
pub struct Autostart {
    dir: PathBuf,
    kind: EntryKind,
}

impl Autostart {
    /// XDG autostart entry in `dir` (normally `~/.config/autostart`).
    pub fn desktop_entry(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            kind: EntryKind::Desktop,
        }
    }

    /// LaunchAgent property list in `dir` (normally `~/Library/LaunchAgents`).
    pub fn launch_agent(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            kind: EntryKind::LaunchAgent,
        }
    }

    /// Shell shortcut in `dir` (normally the Startup folder).
    #[cfg(target_os = "windows")]
    pub fn startup_shortcut(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            kind: EntryKind::Shortcut,
        }
    }

    /// The entry for the running platform and user.
    ///
    /// # Errors
    ///
    /// Returns [`AutostartError::NoAutostartDir`] when the home (or
    /// `APPDATA`) directory is not set, or on unsupported platforms.
    pub fn for_platform() -> Result<Self, AutostartError> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var_os("APPDATA").ok_or(AutostartError::NoAutostartDir)?;
            Ok(Self::startup_shortcut(
                PathBuf::from(appdata)
                    .join("Microsoft")
                    .join("Windows")
                    .join("Start Menu")
                    .join("Programs")
                    .join("Startup"),
            ))
        }

        #[cfg(target_os = "linux")]
        {
            let base = std::env::var_os("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok_or(AutostartError::NoAutostartDir)?;
            Ok(Self::desktop_entry(base.join("autostart")))
        }

        #[cfg(target_os = "macos")]
        {
            let home = std::env::var_os("HOME").ok_or(AutostartError::NoAutostartDir)?;
            Ok(Self::launch_agent(
                PathBuf::from(home).join("Library").join("LaunchAgents"),
            ))
        }

        #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
        {
            Err(AutostartError::NoAutostartDir)
        }
    }

    /// Full path of the entry file.
    pub fn entry_path(&self) -> PathBuf {
        let file = match self.kind {
            EntryKind::Desktop => "slidermix.desktop".to_string(),
            EntryKind::LaunchAgent => format!("{LAUNCH_AGENT_LABEL}.plist"),
            #[cfg(target_os = "windows")]
            EntryKind::Shortcut => format!("{APP_NAME}.lnk"),
        };
        self.dir.join(file)
    }

    pub fn is_enabled(&self) -> bool {
        self.entry_path().is_file()
    }

    /// Writes the entry so `exe` starts at login, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`AutostartError::Io`] if the directory or file cannot be
    /// written, or [`AutostartError::Shortcut`] on Windows shell failures.
    pub fn enable(&self, exe: &Path) -> Result<PathBuf, AutostartError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| AutostartError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.entry_path();
        match self.kind {
            EntryKind::Desktop => write_file(&path, &desktop_entry_contents(exe))?,
            EntryKind::LaunchAgent => write_file(&path, &launch_agent_plist(exe))?,
            #[cfg(target_os = "windows")]
            EntryKind::Shortcut => shortcut::write(&path, exe)?,
        }
        info!(entry = %path.display(), "autostart enabled");
        Ok(path)
    }

    /// Removes the entry.  Returns `false` when there was nothing to remove.
    ///
    /// # Errors
    ///
    /// Returns [`AutostartError::Io`] if the entry exists but cannot be deleted.
    pub fn disable(&self) -> Result<bool, AutostartError> {
        let path = self.entry_path();
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(entry = %path.display(), "autostart disabled");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(AutostartError::Io { path, source }),
        }
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), AutostartError> {
    std::fs::write(path, content).map_err(|source| AutostartError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Entry contents ────────────────────────────────────────────────────────────

/// XDG desktop entry that launches `exe` at login.
pub fn desktop_entry_contents(exe: &Path) -> String {
    format!(
        "[Desktop Entry]\n\
         Type=Application\n\
         Exec=\"{exec}\"\n\
         Hidden=false\n\
         NoDisplay=false\n\
         X-GNOME-Autostart-enabled=true\n\
         Name={APP_NAME}\n\
         Comment=Start {APP_NAME} at login\n",
        exec = escape_exec_arg(&exe.to_string_lossy()),
    )
}

/// launchd property list that runs `exe` at load.
pub fn launch_agent_plist(exe: &Path) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{LAUNCH_AGENT_LABEL}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{program}</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
</dict>
</plist>
"#,
        program = escape_xml(&exe.to_string_lossy()),
    )
}

/// Escapes a quoted `Exec=` argument (`"`, `` ` ``, `$` and `\`).
fn escape_exec_arg(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len());
    for c in arg.chars() {
        if matches!(c, '"' | '`' | '$' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// ── Windows shell shortcut ────────────────────────────────────────────────────

#[cfg(target_os = "windows")]
mod shortcut {
    use std::path::Path;

    use windows::core::{Interface, HSTRING};
    use windows::Win32::System::Com::{
        CoCreateInstance, CoInitializeEx, IPersistFile, CLSCTX_INPROC_SERVER,
        COINIT_APARTMENTTHREADED,
    };
    use windows::Win32::UI::Shell::{IShellLinkW, ShellLink};

    use super::AutostartError;

    fn shell(e: windows::core::Error) -> AutostartError {
        AutostartError::Shortcut(e.message().to_string())
    }

    /// Saves a `.lnk` at `path` targeting `exe`, started in its own directory.
    pub(super) fn write(path: &Path, exe: &Path) -> Result<(), AutostartError> {
        unsafe {
            // S_FALSE (already initialized) is fine.
            let _ = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
            let link: IShellLinkW =
                CoCreateInstance(&ShellLink, None, CLSCTX_INPROC_SERVER).map_err(shell)?;
            link.SetPath(&HSTRING::from(exe.as_os_str()))
                .map_err(shell)?;
            if let Some(dir) = exe.parent() {
                link.SetWorkingDirectory(&HSTRING::from(dir.as_os_str()))
                    .map_err(shell)?;
            }
            let file: IPersistFile = link.cast().map_err(shell)?;
            file.Save(&HSTRING::from(path.as_os_str()), true)
                .map_err(shell)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("slidermix_autostart_{}_{tag}", std::process::id()))
    }

    #[test]
    fn test_enable_writes_xdg_desktop_entry() {
        // Arrange
        let dir = temp_dir("xdg");
        let entry = Autostart::desktop_entry(dir.join("autostart"));
        let exe = Path::new("/opt/slidermix/bin/slidermix");

        // Act
        let path = entry.enable(exe).expect("enable");
        let content = std::fs::read_to_string(&path).expect("read entry");

        // Assert
        assert_eq!(path, dir.join("autostart").join("slidermix.desktop"));
        assert!(content.starts_with("[Desktop Entry]\n"));
        assert!(content.contains("Type=Application\n"));
        assert!(content.contains("Exec=\"/opt/slidermix/bin/slidermix\"\n"));
        assert!(content.contains("X-GNOME-Autostart-enabled=true\n"));
        assert!(content.contains("Name=SliderMix\n"));
        assert!(entry.is_enabled());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_enable_writes_launch_agent_plist() {
        // Arrange
        let dir = temp_dir("launchd");
        let entry = Autostart::launch_agent(&dir);
        let exe = Path::new("/Applications/SliderMix.app/Contents/MacOS/slidermix");

        // Act
        let path = entry.enable(exe).expect("enable");
        let content = std::fs::read_to_string(&path).expect("read plist");

        // Assert
        assert_eq!(path, dir.join("com.slidermix.agent.plist"));
        assert!(content.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(content.contains("<string>com.slidermix.agent</string>"));
        assert!(content.contains(
            "<string>/Applications/SliderMix.app/Contents/MacOS/slidermix</string>"
        ));
        assert!(content.contains("<key>RunAtLoad</key>\n    <true/>"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_disable_removes_entry_and_tolerates_absence() {
        // Arrange
        let dir = temp_dir("disable");
        let entry = Autostart::desktop_entry(&dir);
        entry.enable(Path::new("/usr/bin/slidermix")).expect("enable");

        // Act
        let first = entry.disable().expect("first disable");
        let second = entry.disable().expect("second disable");

        // Assert
        assert!(first);
        assert!(!second);
        assert!(!entry.is_enabled());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_enable_twice_replaces_previous_entry() {
        let dir = temp_dir("replace");
        let entry = Autostart::launch_agent(&dir);

        entry.enable(Path::new("/old/slidermix")).expect("first enable");
        let path = entry.enable(Path::new("/new/slidermix")).expect("second enable");
        let content = std::fs::read_to_string(path).expect("read plist");

        assert!(content.contains("/new/slidermix"));
        assert!(!content.contains("/old/slidermix"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_special_characters_in_exe_path_are_escaped() {
        let exe = Path::new("/home/a&b/my \"mix\"/$bin");

        let desktop = desktop_entry_contents(exe);
        let plist = launch_agent_plist(exe);

        assert!(desktop.contains(r#"Exec="/home/a&b/my \"mix\"/\$bin""#));
        assert!(plist.contains("<string>/home/a&amp;b/my \"mix\"/$bin</string>"));
    }
}
