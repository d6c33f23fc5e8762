//! Linux backend: PulseAudio (or PipeWire's Pulse server) via `pactl`.
//!
//! - Master volume: `pactl get-sink-volume` / `set-sink-volume @DEFAULT_SINK@`.
//! - Application volume: `pactl list sink-inputs`, matched case-insensitively
//!   on `application.process.binary` or `application.name`; every matching
//!   sink input is set.
//! - Focused application: `xdotool getactivewindow getwindowpid`, then
//!   `/proc/<pid>/comm`.
//! - Brightness: the first device under `/sys/class/backlight`.  Writing
//!   usually needs a udev rule granting the user write access.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use slidermix_core::{clamp_level, names_match};
use tokio::process::Command;
use tracing::trace;

use crate::application::resolvers::{HostAudio, ResolveError};

const DEFAULT_SINK: &str = "@DEFAULT_SINK@";
const BACKLIGHT_ROOT: &str = "/sys/class/backlight";

/// `pactl`-backed implementation of [`HostAudio`].
#[derive(Debug, Clone)]
pub struct PulseHostAudio {
    backlight_root: PathBuf,
}

impl PulseHostAudio {
    pub fn new() -> Self {
        Self {
            backlight_root: PathBuf::from(BACKLIGHT_ROOT),
        }
    }

    /// Uses `root` instead of `/sys/class/backlight`.
    pub fn with_backlight_root(root: impl Into<PathBuf>) -> Self {
        Self {
            backlight_root: root.into(),
        }
    }

    async fn matching_inputs(&self, name: &str) -> Result<Vec<SinkInput>, ResolveError> {
        let listing = run("pactl", &["list", "sink-inputs"]).await?;
        let inputs: Vec<SinkInput> = parse_sink_inputs(&listing)
            .into_iter()
            .filter(|input| input.matches(name))
            .collect();
        if inputs.is_empty() {
            return Err(ResolveError::NotFound(format!("no audio session for {name}")));
        }
        Ok(inputs)
    }

    async fn backlight_device(&self) -> Result<PathBuf, ResolveError> {
        let mut entries = tokio::fs::read_dir(&self.backlight_root)
            .await
            .map_err(|e| ResolveError::NotFound(format!("no backlight: {e}")))?;
        let mut devices = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ResolveError::SubsystemFailure(e.to_string()))?
        {
            devices.push(entry.path());
        }
        devices.sort();
        devices
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::NotFound("no backlight device".to_string()))
    }
}

impl Default for PulseHostAudio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostAudio for PulseHostAudio {
    async fn master_volume(&self) -> Result<f32, ResolveError> {
        let out = run("pactl", &["get-sink-volume", DEFAULT_SINK]).await?;
        parse_percent(&out)
            .map(percent_to_level)
            .ok_or_else(|| ResolveError::SubsystemFailure(format!("unparsable volume: {out}")))
    }

    async fn set_master_volume(&self, level: f32) -> Result<(), ResolveError> {
        let arg = percent_arg(level);
        run("pactl", &["set-sink-volume", DEFAULT_SINK, &arg]).await?;
        Ok(())
    }

    async fn app_volume(&self, name: &str) -> Result<f32, ResolveError> {
        let inputs = self.matching_inputs(name).await?;
        inputs
            .iter()
            .find_map(|input| input.volume_percent)
            .map(percent_to_level)
            .ok_or_else(|| ResolveError::SubsystemFailure(format!("no volume reported for {name}")))
    }

    async fn set_app_volume(&self, name: &str, level: f32) -> Result<(), ResolveError> {
        let arg = percent_arg(level);
        for input in self.matching_inputs(name).await? {
            let index = input.index.to_string();
            run("pactl", &["set-sink-input-volume", &index, &arg]).await?;
        }
        Ok(())
    }

    async fn foreground_app(&self) -> Result<Option<String>, ResolveError> {
        let output = command("xdotool")
            .args(["getactivewindow", "getwindowpid"])
            .output()
            .await
            .map_err(|e| ResolveError::SubsystemFailure(format!("xdotool: {e}")))?;
        if !output.status.success() {
            // No active window (e.g. an empty desktop).
            return Ok(None);
        }
        let Ok(pid) = String::from_utf8_lossy(&output.stdout).trim().parse::<u32>() else {
            return Ok(None);
        };
        match tokio::fs::read_to_string(format!("/proc/{pid}/comm")).await {
            Ok(comm) => Ok(Some(comm.trim().to_string()).filter(|s| !s.is_empty())),
            Err(_) => Ok(None),
        }
    }

    async fn brightness(&self) -> Result<u8, ResolveError> {
        let device = self.backlight_device().await?;
        let current = read_number(&device.join("brightness")).await?;
        let max = read_number(&device.join("max_brightness")).await?;
        Ok(scale_to_percent(current, max))
    }

    async fn set_brightness(&self, percent: u8) -> Result<(), ResolveError> {
        let device = self.backlight_device().await?;
        let max = read_number(&device.join("max_brightness")).await?;
        let raw = scale_from_percent(percent, max);
        tokio::fs::write(device.join("brightness"), raw.to_string())
            .await
            .map_err(|e| ResolveError::SubsystemFailure(format!("backlight write: {e}")))
    }
}

// ── pactl output parsing ──────────────────────────────────────────────────────

/// One entry of `pactl list sink-inputs`.
#[derive(Debug, Clone, Default, PartialEq)]
struct SinkInput {
    index: u32,
    volume_percent: Option<u32>,
    app_name: Option<String>,
    binary: Option<String>,
}

impl SinkInput {
    fn matches(&self, name: &str) -> bool {
        [&self.binary, &self.app_name]
            .into_iter()
            .flatten()
            .any(|candidate| names_match(candidate, name))
    }
}

fn parse_sink_inputs(listing: &str) -> Vec<SinkInput> {
    let mut inputs = Vec::new();
    let mut current: Option<SinkInput> = None;

    for raw in listing.lines() {
        let line = raw.trim();
        if let Some(rest) = line.strip_prefix("Sink Input #") {
            if let Some(done) = current.take() {
                inputs.push(done);
            }
            current = rest.trim().parse().ok().map(|index| SinkInput {
                index,
                ..SinkInput::default()
            });
            continue;
        }
        let Some(input) = current.as_mut() else {
            continue;
        };
        if line.starts_with("Volume:") {
            input.volume_percent = parse_percent(line);
        } else if let Some(value) = property(line, "application.name") {
            input.app_name = Some(value);
        } else if let Some(value) = property(line, "application.process.binary") {
            input.binary = Some(value);
        }
    }
    inputs.extend(current);
    trace!(count = inputs.len(), "parsed sink inputs");
    inputs
}

/// Extracts `value` from `key = "value"`.
fn property(line: &str, key: &str) -> Option<String> {
    let rest = line.strip_prefix(key)?.trim_start().strip_prefix('=')?;
    Some(rest.trim().trim_matches('"').to_string())
}

/// First `NN%` token in a `pactl` volume line.
fn parse_percent(text: &str) -> Option<u32> {
    text.split_whitespace()
        .find_map(|token| token.strip_suffix('%'))
        .and_then(|digits| digits.parse().ok())
}

fn percent_to_level(percent: u32) -> f32 {
    clamp_level(percent as f32 / 100.0)
}

fn percent_arg(level: f32) -> String {
    format!("{}%", (clamp_level(level) * 100.0).round() as u32)
}

fn scale_to_percent(current: u64, max: u64) -> u8 {
    if max == 0 {
        return 0;
    }
    ((current.min(max) as f64 / max as f64) * 100.0).round() as u8
}

fn scale_from_percent(percent: u8, max: u64) -> u64 {
    ((f64::from(percent.min(100)) / 100.0) * max as f64).round() as u64
}

// ── Process & file helpers ────────────────────────────────────────────────────

/// Child processes die with the future awaiting them, so a resolver timeout
/// does not leave `pactl` or `xdotool` running.
fn command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.kill_on_drop(true);
    cmd
}

async fn run(program: &str, args: &[&str]) -> Result<String, ResolveError> {
    let output = command(program)
        .args(args)
        .output()
        .await
        .map_err(|e| ResolveError::SubsystemFailure(format!("{program}: {e}")))?;
    if !output.status.success() {
        return Err(ResolveError::SubsystemFailure(format!(
            "{program} {}: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn read_number(path: &Path) -> Result<u64, ResolveError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ResolveError::SubsystemFailure(format!("{}: {e}", path.display())))?;
    text.trim()
        .parse()
        .map_err(|_| ResolveError::SubsystemFailure(format!("{}: not a number", path.display())))
}
