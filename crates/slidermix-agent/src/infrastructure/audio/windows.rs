//! Windows backend: Core Audio (WASAPI) for volumes, DDC/CI for brightness.
//!
//! COM calls run on the blocking pool; each call initializes COM for its
//! worker thread in the multithreaded apartment, which is a no-op when the
//! thread is already initialized.
//!
//! Application sessions are matched against the owning process's executable
//! name, with or without the `.exe` suffix, ignoring case.  Every matching
//! session is set, so a browser with several audio sessions moves together.
//!
//! Brightness drives every physical monitor that answers DDC/CI: a write sets
//! all of them and a read reports their average.  Monitors without DDC/CI
//! support are skipped.

use async_trait::async_trait;
use slidermix_core::{clamp_level, names_match};
use tracing::{debug, trace};
use windows::core::{Interface, BOOL};
use windows::Win32::Devices::Display::{
    DestroyPhysicalMonitors, GetMonitorBrightness, GetNumberOfPhysicalMonitorsFromHMONITOR,
    GetPhysicalMonitorsFromHMONITOR, SetMonitorBrightness, PHYSICAL_MONITOR,
};
use windows::Win32::Foundation::{CloseHandle, LPARAM, RECT};
use windows::Win32::Graphics::Gdi::{EnumDisplayMonitors, HDC, HMONITOR};
use windows::Win32::Media::Audio::Endpoints::IAudioEndpointVolume;
use windows::Win32::Media::Audio::{
    eMultimedia, eRender, IAudioSessionControl2, IAudioSessionManager2, IMMDevice,
    IMMDeviceEnumerator, ISimpleAudioVolume, MMDeviceEnumerator,
};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CLSCTX_ALL, COINIT_MULTITHREADED,
};
use windows::Win32::System::ProcessStatus::GetModuleBaseNameW;
use windows::Win32::System::Threading::{
    OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
};
use windows::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowThreadProcessId};

use crate::application::resolvers::{HostAudio, ResolveError};

/// Core Audio implementation of [`HostAudio`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsHostAudio;

impl WindowsHostAudio {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostAudio for WindowsHostAudio {
    async fn master_volume(&self) -> Result<f32, ResolveError> {
        blocking(|| unsafe {
            let endpoint = endpoint_volume()?;
            endpoint.GetMasterVolumeLevelScalar().map_err(subsystem)
        })
        .await
    }

    async fn set_master_volume(&self, level: f32) -> Result<(), ResolveError> {
        let level = clamp_level(level);
        blocking(move || unsafe {
            let endpoint = endpoint_volume()?;
            endpoint
                .SetMasterVolumeLevelScalar(level, std::ptr::null())
                .map_err(subsystem)
        })
        .await
    }

    async fn app_volume(&self, name: &str) -> Result<f32, ResolveError> {
        let name = name.to_string();
        blocking(move || unsafe {
            let sessions = matching_sessions(&name)?;
            let first = sessions
                .first()
                .ok_or_else(|| ResolveError::NotFound(format!("no audio session for {name}")))?;
            first.GetMasterVolume().map_err(subsystem)
        })
        .await
    }

    async fn set_app_volume(&self, name: &str, level: f32) -> Result<(), ResolveError> {
        let name = name.to_string();
        let level = clamp_level(level);
        blocking(move || unsafe {
            let sessions = matching_sessions(&name)?;
            if sessions.is_empty() {
                return Err(ResolveError::NotFound(format!("no audio session for {name}")));
            }
            for volume in sessions {
                volume
                    .SetMasterVolume(level, std::ptr::null())
                    .map_err(subsystem)?;
            }
            Ok(())
        })
        .await
    }

    async fn foreground_app(&self) -> Result<Option<String>, ResolveError> {
        blocking(|| unsafe {
            let hwnd = GetForegroundWindow();
            if hwnd.is_invalid() {
                return Ok(None);
            }
            let mut pid = 0u32;
            GetWindowThreadProcessId(hwnd, Some(&mut pid as *mut u32));
            if pid == 0 {
                return Ok(None);
            }
            Ok(process_name(pid).map(|name| strip_exe(&name).to_string()))
        })
        .await
    }

    async fn brightness(&self) -> Result<u8, ResolveError> {
        blocking(|| unsafe {
            with_physical_monitors(|monitors| {
                let levels: Vec<u8> = monitors
                    .iter()
                    .filter_map(|monitor| read_brightness(monitor).ok())
                    .map(|(min, current, max)| to_percent(current, min, max))
                    .collect();
                average_percent(&levels).ok_or_else(no_ddc)
            })
        })
        .await
    }

    async fn set_brightness(&self, percent: u8) -> Result<(), ResolveError> {
        blocking(move || unsafe {
            with_physical_monitors(|monitors| {
                let mut updated = 0usize;
                for monitor in monitors {
                    let Ok((min, _current, max)) = read_brightness(monitor) else {
                        continue;
                    };
                    let value = from_percent(percent, min, max);
                    trace!(value, min, max, "setting monitor brightness");
                    if SetMonitorBrightness(monitor.hPhysicalMonitor, value) == 0 {
                        debug!("monitor rejected brightness change");
                        continue;
                    }
                    updated += 1;
                }
                if updated == 0 {
                    return Err(no_ddc());
                }
                Ok(())
            })
        })
        .await
    }
}

// ── COM helpers ───────────────────────────────────────────────────────────────

async fn blocking<T, F>(f: F) -> Result<T, ResolveError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ResolveError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        // S_FALSE (already initialized) is fine.
        let _ = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        f()
    })
    .await
    .map_err(|e| ResolveError::SubsystemFailure(format!("audio worker panicked: {e}")))?
}

fn subsystem(e: windows::core::Error) -> ResolveError {
    ResolveError::SubsystemFailure(e.message().to_string())
}

unsafe fn default_device() -> Result<IMMDevice, ResolveError> {
    let enumerator: IMMDeviceEnumerator =
        CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(subsystem)?;
    enumerator
        .GetDefaultAudioEndpoint(eRender, eMultimedia)
        .map_err(|e| ResolveError::NotFound(format!("no default output device: {}", e.message())))
}

unsafe fn endpoint_volume() -> Result<IAudioEndpointVolume, ResolveError> {
    default_device()?
        .Activate::<IAudioEndpointVolume>(CLSCTX_ALL, None)
        .map_err(subsystem)
}

unsafe fn matching_sessions(name: &str) -> Result<Vec<ISimpleAudioVolume>, ResolveError> {
    let manager = default_device()?
        .Activate::<IAudioSessionManager2>(CLSCTX_ALL, None)
        .map_err(subsystem)?;
    let sessions = manager.GetSessionEnumerator().map_err(subsystem)?;
    let count = sessions.GetCount().map_err(subsystem)?;

    let mut matches = Vec::new();
    for i in 0..count {
        let Ok(session) = sessions.GetSession(i) else {
            continue;
        };
        let Ok(control) = session.cast::<IAudioSessionControl2>() else {
            continue;
        };
        let pid = match control.GetProcessId() {
            Ok(pid) if pid != 0 => pid,
            _ => continue,
        };
        let Some(process) = process_name(pid) else {
            continue;
        };
        if names_match(strip_exe(&process), name) || names_match(&process, name) {
            if let Ok(volume) = session.cast::<ISimpleAudioVolume>() {
                matches.push(volume);
            }
        }
    }
    Ok(matches)
}

unsafe fn process_name(pid: u32) -> Option<String> {
    let handle = OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, pid).ok()?;
    let mut buffer = [0u16; 260];
    let len = GetModuleBaseNameW(handle, None, &mut buffer);
    let _ = CloseHandle(handle);
    if len == 0 {
        return None;
    }
    Some(String::from_utf16_lossy(&buffer[..len as usize]).to_lowercase())
}

unsafe fn read_brightness(monitor: &PHYSICAL_MONITOR) -> Result<(u32, u32, u32), ResolveError> {
    let (mut min, mut current, mut max) = (0u32, 0u32, 0u32);
    let ok = GetMonitorBrightness(monitor.hPhysicalMonitor, &mut min, &mut current, &mut max);
    if ok == 0 {
        return Err(ResolveError::SubsystemFailure(
            "monitor does not report brightness over DDC/CI".to_string(),
        ));
    }
    Ok((min, current, max))
}

fn no_ddc() -> ResolveError {
    ResolveError::SubsystemFailure("no monitor accepts brightness over DDC/CI".to_string())
}

/// Win32 monitor enumeration callback.
///
/// # Safety
///
/// `data` must point to a live `Vec<HMONITOR>` for the whole enumeration.
unsafe extern "system" fn collect_monitor(
    hmonitor: HMONITOR,
    _hdc: HDC,
    _rect: *mut RECT,
    data: LPARAM,
) -> BOOL {
    let handles = &mut *(data.0 as *mut Vec<HMONITOR>);
    handles.push(hmonitor);
    BOOL(1) // continue enumeration
}

/// Runs `f` over the physical monitors behind every display.
unsafe fn with_physical_monitors<T>(
    f: impl FnOnce(&[PHYSICAL_MONITOR]) -> Result<T, ResolveError>,
) -> Result<T, ResolveError> {
    let mut handles: Vec<HMONITOR> = Vec::new();
    // SAFETY: the callback only runs inside this call, while `handles` is alive.
    let _ = EnumDisplayMonitors(
        None,
        None,
        Some(collect_monitor),
        LPARAM(&mut handles as *mut Vec<HMONITOR> as isize),
    );

    let mut monitors = Vec::new();
    for hmonitor in handles {
        let mut count = 0u32;
        if GetNumberOfPhysicalMonitorsFromHMONITOR(hmonitor, &mut count).is_err() || count == 0 {
            continue;
        }
        let mut physical = vec![PHYSICAL_MONITOR::default(); count as usize];
        if GetPhysicalMonitorsFromHMONITOR(hmonitor, &mut physical).is_ok() {
            monitors.extend(physical);
        }
    }
    if monitors.is_empty() {
        return Err(ResolveError::NotFound("no physical monitor".to_string()));
    }

    let result = f(&monitors);
    let _ = DestroyPhysicalMonitors(&monitors);
    result
}

// ── Pure conversions ──────────────────────────────────────────────────────────

fn strip_exe(name: &str) -> &str {
    let lower = name.len().saturating_sub(4);
    match name.get(lower..) {
        Some(suffix) if suffix.eq_ignore_ascii_case(".exe") => &name[..lower],
        _ => name,
    }
}

fn to_percent(current: u32, min: u32, max: u32) -> u8 {
    if max <= min {
        return 0;
    }
    let span = (max - min) as f64;
    ((current.clamp(min, max) - min) as f64 / span * 100.0).round() as u8
}

/// Rounded mean of per-monitor levels; `None` when no monitor reported one.
fn average_percent(levels: &[u8]) -> Option<u8> {
    if levels.is_empty() {
        return None;
    }
    let sum: u32 = levels.iter().map(|&l| u32::from(l)).sum();
    Some((f64::from(sum) / levels.len() as f64).round() as u8)
}

fn from_percent(percent: u8, min: u32, max: u32) -> u32 {
    if max <= min {
        return min;
    }
    let span = (max - min) as f64;
    min + (f64::from(percent.min(100)) / 100.0 * span).round() as u32
}
