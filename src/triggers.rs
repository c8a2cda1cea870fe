//! Trigger layer: the producers that enqueue annotation requests.
//!
//! Producers never touch host handles; they only put requests on the worker's
//! queue and return immediately. Two producers exist: the global hotkey
//! listener (Windows only) and a stdin command loop that doubles as the quit
//! mechanism on every platform.

use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};

use crate::worker::{AnnotationRequest, WorkerHandle};

/// Blocking command loop on stdin. Returns when the user quits or stdin
/// closes.
///
/// Commands:
///   a            annotate the selected cell
///   p <prompt>   annotate with a custom prompt
///   h            check the Excel connection
///   q            quit
pub fn run_command_loop(worker: &WorkerHandle) -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let input = line.trim();
        match input {
            "" => continue,
            "a" | "annotate" => worker.enqueue(AnnotationRequest::auto()),
            "h" | "health" => worker.request_health_check(),
            "q" | "quit" | "exit" => break,
            _ => {
                if let Some(prompt) = input.strip_prefix("p ") {
                    let prompt = prompt.trim();
                    if prompt.is_empty() {
                        warn!("Empty prompt ignored");
                    } else {
                        worker.enqueue(AnnotationRequest::prompted(prompt.to_string()));
                    }
                } else {
                    warn!("Unknown command '{input}' (a, p <prompt>, h, q)");
                }
            }
        }
    }
    Ok(())
}

/// Registers the global hotkeys and services their message loop on a
/// dedicated thread. Hotkey messages are delivered to the registering thread,
/// so registration and the loop must share one.
#[cfg(windows)]
pub fn spawn_hotkey_listener(worker: Arc<WorkerHandle>) {
    std::thread::Builder::new()
        .name("hotkeys".to_string())
        .spawn(move || {
            if let Err(err) = hotkey_loop(&worker) {
                warn!("Hotkey listener stopped: {err}");
            }
        })
        .expect("failed to spawn hotkey thread");
}

#[cfg(windows)]
fn hotkey_loop(worker: &WorkerHandle) -> Result<()> {
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, MOD_CONTROL, MOD_SHIFT,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetMessageW, MSG, WM_HOTKEY};

    const ID_ANNOTATE: i32 = 1;
    const ID_HEALTH: i32 = 2;

    unsafe {
        RegisterHotKey(HWND::default(), ID_ANNOTATE, MOD_CONTROL | MOD_SHIFT, 'M' as u32)
            .map_err(|e| anyhow::anyhow!("RegisterHotKey Ctrl+Shift+M failed: {e}"))?;
        RegisterHotKey(HWND::default(), ID_HEALTH, MOD_CONTROL | MOD_SHIFT, 'H' as u32)
            .map_err(|e| anyhow::anyhow!("RegisterHotKey Ctrl+Shift+H failed: {e}"))?;
    }
    info!("Global hotkeys registered: Ctrl+Shift+M annotate, Ctrl+Shift+H health check");

    unsafe {
        let mut msg = MSG::default();
        while GetMessageW(&mut msg, HWND::default(), 0, 0).into() {
            if msg.message == WM_HOTKEY {
                match msg.wParam.0 as i32 {
                    ID_ANNOTATE => worker.enqueue(AnnotationRequest::auto()),
                    ID_HEALTH => worker.request_health_check(),
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

#[cfg(not(windows))]
pub fn spawn_hotkey_listener(_worker: Arc<WorkerHandle>) {
    info!("Global hotkeys are only available on Windows; use the console commands");
}
