use super::{HookEventSource, HookHandler};
use crate::clock::SystemClock;
use crate::event::{MouseButton, Point};
use crate::instance;
use anyhow::anyhow;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW,
    SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, HC_ACTION, HHOOK, MSG,
    MSLLHOOKSTRUCT, PM_NOREMOVE, WH_MOUSE_LL, WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MOUSEMOVE,
    WM_QUIT, WM_RBUTTONDOWN, WM_RBUTTONUP,
};

const INSTALL_TIMEOUT: Duration = Duration::from_secs(2);

struct HookThread {
    thread_id: u32,
    join: JoinHandle<()>,
}

impl HookThread {
    /// Ask the message loop to exit and wait for it. The hook is removed on
    /// the way out.
    fn shut_down(self) -> anyhow::Result<()> {
        unsafe {
            let _ = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
        self.join
            .join()
            .map_err(|_| anyhow!("pointer hook thread panicked"))
    }
}

/// `WH_MOUSE_LL` adapter. The hook lives on a dedicated thread running a
/// message loop; the hook procedure forwards to the handler published in the
/// process instance slot.
#[derive(Default)]
pub struct WindowsHookSource {
    hook_thread: Option<HookThread>,
}

impl HookEventSource for WindowsHookSource {
    fn install(&mut self, _handler: Arc<dyn HookHandler>) -> anyhow::Result<()> {
        if self.hook_thread.is_some() {
            return Ok(());
        }
        if instance::active_id().is_none() {
            return Err(anyhow!("no active monitor to receive pointer events"));
        }

        let (id_tx, id_rx) = mpsc::sync_channel::<u32>(1);
        let (hooked_tx, hooked_rx) = mpsc::sync_channel::<anyhow::Result<()>>(1);
        let join = std::thread::Builder::new()
            .name("dragwatch-hook".into())
            .spawn(move || run_hook_thread(id_tx, hooked_tx))?;

        // The id is sent before anything that can stall, so a closed channel
        // means the thread is already gone.
        let Ok(thread_id) = id_rx.recv() else {
            let _ = join.join();
            return Err(anyhow!("pointer hook thread exited during startup"));
        };
        let thread = HookThread { thread_id, join };

        match hooked_rx.recv_timeout(INSTALL_TIMEOUT) {
            Ok(Ok(())) => {
                tracing::debug!(thread_id, "pointer hook installed");
                self.hook_thread = Some(thread);
                Ok(())
            }
            Ok(Err(err)) => {
                thread.shut_down()?;
                Err(err)
            }
            Err(_) => {
                // A hook that lands late still sees the queued WM_QUIT.
                tracing::warn!(thread_id, "pointer hook install timed out");
                thread.shut_down()?;
                Err(anyhow!(
                    "pointer hook not installed within {INSTALL_TIMEOUT:?}"
                ))
            }
        }
    }

    fn uninstall(&mut self) -> anyhow::Result<()> {
        if let Some(thread) = self.hook_thread.take() {
            thread.shut_down()?;
            tracing::debug!("pointer hook removed");
        }
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.hook_thread.is_some()
    }
}

fn run_hook_thread(id_tx: mpsc::SyncSender<u32>, hooked_tx: mpsc::SyncSender<anyhow::Result<()>>) {
    // Create the message queue before the id escapes so WM_QUIT can't be lost.
    let mut msg = MSG::default();
    unsafe {
        let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
    }
    if id_tx.send(unsafe { GetCurrentThreadId() }).is_err() {
        return;
    }

    let hook = match install_mouse_hook() {
        Ok(hook) => hook,
        Err(err) => {
            let _ = hooked_tx.send(Err(err));
            return;
        }
    };
    let _ = hooked_tx.send(Ok(()));

    pump_messages(&mut msg);
    unsafe {
        let _ = UnhookWindowsHookEx(hook);
    }
}

fn install_mouse_hook() -> anyhow::Result<HHOOK> {
    let module = unsafe { GetModuleHandleW(None) }?;
    let hook = unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), module, 0) }?;
    if hook.0.is_null() {
        return Err(anyhow!(windows::core::Error::from_win32()));
    }
    Ok(hook)
}

/// Runs until WM_QUIT or a GetMessageW failure.
fn pump_messages(msg: &mut MSG) {
    loop {
        let status = unsafe { GetMessageW(msg, None, 0, 0) };
        if status.0 == 0 || status.0 == -1 {
            break;
        }
        unsafe {
            let _ = TranslateMessage(msg);
            DispatchMessageW(msg);
        }
    }
}

unsafe extern "system" fn mouse_hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        let info = &*(l_param.0 as *const MSLLHOOKSTRUCT);
        let point = Point::new(f64::from(info.pt.x), f64::from(info.pt.y));
        let time_ms = SystemClock::now();

        match w_param.0 as u32 {
            WM_MOUSEMOVE => {
                instance::with_active(|h| h.on_move(point, time_ms));
            }
            WM_LBUTTONDOWN => {
                instance::with_active(|h| h.on_button_down(MouseButton::Left, point, time_ms));
            }
            WM_LBUTTONUP => {
                instance::with_active(|h| h.on_button_up(MouseButton::Left, point, time_ms));
            }
            WM_RBUTTONDOWN => {
                instance::with_active(|h| h.on_button_down(MouseButton::Right, point, time_ms));
            }
            WM_RBUTTONUP => {
                instance::with_active(|h| h.on_button_up(MouseButton::Right, point, time_ms));
            }
            _ => {}
        }
    }

    CallNextHookEx(HHOOK(std::ptr::null_mut()), n_code, w_param, l_param)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn quit_posted_before_a_slow_start_still_stops_the_thread() {
        let (id_tx, id_rx) = mpsc::sync_channel::<u32>(1);
        let join = std::thread::spawn(move || {
            let mut msg = MSG::default();
            unsafe {
                let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
            }
            id_tx.send(unsafe { GetCurrentThreadId() }).unwrap();
            // Stands in for a SetWindowsHookExW call that outlives the timeout.
            std::thread::sleep(Duration::from_millis(200));
            pump_messages(&mut msg);
        });
        let thread = HookThread {
            thread_id: id_rx.recv().unwrap(),
            join,
        };

        let started = Instant::now();
        thread.shut_down().unwrap();
        assert!(started.elapsed() < INSTALL_TIMEOUT);
    }

    #[test]
    fn uninstall_without_install_is_a_no_op() {
        let mut source = WindowsHookSource::default();
        assert!(!source.is_installed());
        source.uninstall().unwrap();
    }
}
