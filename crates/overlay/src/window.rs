//! Overlay window implementation
//!
//! A topmost popup covering the whole virtual desktop shows a frozen frame
//! and feeds raw input into the session's selection machine. The process
//! must be per-monitor DPI aware so client coordinates are physical pixels.
//!
//! The popup is excluded from screen capture, so the session's worker can
//! grab live pixels around the pointer for the magnifier while it is shown.

use crate::magnifier;
use crate::orchestrator::{RegionCaptureSession, SessionOutcome};
use crate::render::OverlayRenderer;
use crate::selection::{
    Effect, Key, Modifiers, PointerButton, PointerPosition, SelectionEvent, SelectionState,
};
use crate::OverlayResult;
use capture::{PhysicalPoint, PhysicalRect, PixelBuffer};
use std::cell::RefCell;
use tracing::{debug, warn};
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::Graphics::Gdi::{InvalidateRect, UpdateWindow};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetKeyState, ReleaseCapture, SetCapture, VK_CONTROL, VK_DOWN, VK_ESCAPE, VK_LEFT, VK_MENU,
    VK_NUMPAD0, VK_NUMPAD9, VK_OEM_3, VK_RETURN, VK_RIGHT, VK_SHIFT, VK_UP,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW, KillTimer,
    LoadCursorW, RegisterClassExW, SetForegroundWindow, SetTimer, SetWindowDisplayAffinity,
    ShowWindow, TranslateMessage, CS_HREDRAW, CS_VREDRAW, IDC_CROSS, MSG, SW_SHOW,
    WDA_EXCLUDEFROMCAPTURE, WM_CLOSE, WM_DESTROY, WM_KEYDOWN, WM_KEYUP, WM_LBUTTONDOWN,
    WM_LBUTTONUP, WM_MOUSEMOVE, WM_PAINT, WM_RBUTTONDOWN, WM_SYSKEYDOWN, WM_SYSKEYUP, WM_TIMER,
    WNDCLASSEXW, WS_EX_TOOLWINDOW, WS_EX_TOPMOST, WS_POPUP,
};

const MAGNIFIER_TIMER: usize = 1;

/// Poll interval for finished magnifier frames.
const MAGNIFIER_INTERVAL_MS: u32 = 30;

thread_local! {
    static OVERLAY_STATE: RefCell<Option<Box<OverlayState>>> = RefCell::new(None);
}

struct OverlayState {
    session: RegionCaptureSession,
    renderer: OverlayRenderer,
    desktop: PhysicalRect,
    pointer: Option<PhysicalPoint>,
    /// Set once the window is excluded from capture; otherwise the worker
    /// would only see the overlay itself.
    live_magnifier: bool,
    closed: bool,
}

impl OverlayState {
    fn dispatch(&mut self, hwnd: HWND, event: SelectionEvent) {
        let effects = self.session.handle_event(event);
        let dragging = self.session.machine().state() == SelectionState::DragSelecting;

        for effect in effects {
            match effect {
                Effect::Redraw => unsafe {
                    let _ = InvalidateRect(hwnd, None, false);
                },
                Effect::HoverChanged(window) => {
                    self.renderer.set_hover(window.map(|w| w.bounds));
                }
                Effect::SelectionChanged(selection) => {
                    self.renderer.set_selection(Some(selection.physical));
                }
                Effect::SelectionCleared => self.renderer.set_selection(None),
                Effect::Confirmed(_) | Effect::Cancelled => self.renderer.clear_magnifier(),
            }
        }

        self.renderer.set_dragging(dragging);
    }

    fn desktop_point(&self, lparam: LPARAM) -> PhysicalPoint {
        let x = (lparam.0 & 0xFFFF) as i16 as i32;
        let y = ((lparam.0 >> 16) & 0xFFFF) as i16 as i32;
        self.renderer.to_desktop(x, y)
    }

    fn pointer(&self, lparam: LPARAM) -> PointerPosition {
        PointerPosition::Physical(self.desktop_point(lparam))
    }

    fn track_pointer(&mut self, point: PhysicalPoint) {
        self.pointer = Some(point);
        if self.live_magnifier {
            self.session.request_magnifier(point);
        }
    }

    /// Show the newest magnifier frame, if one arrived since the last tick.
    fn show_magnifier_frame(&mut self, hwnd: HWND) {
        let Some(frame) = self.session.poll_preview() else {
            return;
        };
        let Some(pointer) = self.pointer else {
            return;
        };

        let view = magnifier::view_rect(pointer, frame.rect, self.desktop);
        self.renderer.set_magnifier(view, frame.buffer);
        unsafe {
            let _ = InvalidateRect(hwnd, None, false);
        }
    }
}

/// Overlay window for selection
pub struct OverlayWindow;

impl OverlayWindow {
    const CLASS_NAME: PCWSTR = w!("RegionCapOverlay");

    /// Run the overlay until the user confirms or cancels, then capture.
    pub fn show(session: RegionCaptureSession) -> OverlayResult<SessionOutcome> {
        let session = Self::run(session)?;
        Ok(session.finish())
    }

    /// Run the overlay and hand the session back once it closes.
    pub fn run(session: RegionCaptureSession) -> OverlayResult<RegionCaptureSession> {
        let placement = session.placement();
        let desktop = placement.physical;

        // Freeze the desktop before the popup covers it.
        let backdrop = match session.capture_backdrop() {
            SessionOutcome::Captured { buffer, .. } => buffer,
            other => {
                warn!(?other, "no backdrop frame, showing black");
                PixelBuffer::black(desktop.width, desktop.height)
            }
        };

        let state = Box::new(OverlayState {
            renderer: OverlayRenderer::new(backdrop, desktop.top_left()),
            session,
            desktop,
            pointer: None,
            live_magnifier: false,
            closed: false,
        });

        unsafe {
            let hmodule = GetModuleHandleW(None)?;
            let hinstance = HINSTANCE(hmodule.0);

            let wc = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                style: CS_HREDRAW | CS_VREDRAW,
                lpfnWndProc: Some(Self::wnd_proc),
                hInstance: hinstance,
                hCursor: LoadCursorW(None, IDC_CROSS)?,
                lpszClassName: Self::CLASS_NAME,
                ..Default::default()
            };

            // Fails harmlessly when the class is already registered.
            RegisterClassExW(&wc);

            OVERLAY_STATE.with(|s| {
                *s.borrow_mut() = Some(state);
            });

            let hwnd = match CreateWindowExW(
                WS_EX_TOPMOST | WS_EX_TOOLWINDOW,
                Self::CLASS_NAME,
                w!("RegionCap Selection"),
                WS_POPUP,
                desktop.x,
                desktop.y,
                desktop.width as i32,
                desktop.height as i32,
                None,
                None,
                hinstance,
                None,
            ) {
                Ok(hwnd) => hwnd,
                Err(e) => {
                    OVERLAY_STATE.with(|s| s.borrow_mut().take());
                    return Err(e.into());
                }
            };

            match SetWindowDisplayAffinity(hwnd, WDA_EXCLUDEFROMCAPTURE) {
                Ok(()) if SetTimer(hwnd, MAGNIFIER_TIMER, MAGNIFIER_INTERVAL_MS, None) != 0 => {
                    Self::with_state(|state| state.live_magnifier = true);
                }
                Ok(()) => warn!("magnifier timer unavailable"),
                Err(e) => warn!("overlay cannot be excluded from capture, magnifier off: {}", e),
            }

            let _ = ShowWindow(hwnd, SW_SHOW);
            let _ = SetForegroundWindow(hwnd);
            let _ = UpdateWindow(hwnd);
            debug!(%desktop, "overlay shown");

            let mut msg = MSG::default();
            loop {
                let ret = GetMessageW(&mut msg, None, 0, 0);
                if !ret.as_bool() {
                    break;
                }
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);

                let done = OVERLAY_STATE.with(|s| {
                    s.borrow()
                        .as_ref()
                        .map(|state| state.closed || state.session.is_finished())
                        .unwrap_or(true)
                });
                if done {
                    break;
                }
            }

            let _ = KillTimer(hwnd, MAGNIFIER_TIMER);
            let _ = DestroyWindow(hwnd);
        }

        let state = OVERLAY_STATE
            .with(|s| s.borrow_mut().take())
            .ok_or(crate::OverlayError::Cancelled)?;
        debug!("overlay closed");
        Ok(state.session)
    }

    /// Runs `f` on the overlay state unless it is already borrowed further
    /// up the stack.
    fn with_state(f: impl FnOnce(&mut OverlayState)) {
        OVERLAY_STATE.with(|s| {
            if let Ok(mut guard) = s.try_borrow_mut() {
                if let Some(state) = guard.as_mut() {
                    f(state);
                }
            }
        });
    }

    unsafe extern "system" fn wnd_proc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        match msg {
            WM_PAINT => {
                OVERLAY_STATE.with(|s| {
                    if let Ok(guard) = s.try_borrow() {
                        if let Some(state) = guard.as_ref() {
                            state.renderer.render(hwnd);
                        }
                    }
                });
                LRESULT(0)
            }

            WM_LBUTTONDOWN => {
                SetCapture(hwnd);
                Self::with_state(|state| {
                    let event = SelectionEvent::PointerPressed {
                        position: state.pointer(lparam),
                        button: PointerButton::Primary,
                        modifiers: current_modifiers(),
                    };
                    state.dispatch(hwnd, event);
                });
                LRESULT(0)
            }

            WM_RBUTTONDOWN => {
                Self::with_state(|state| {
                    let event = SelectionEvent::PointerPressed {
                        position: state.pointer(lparam),
                        button: PointerButton::Secondary,
                        modifiers: current_modifiers(),
                    };
                    state.dispatch(hwnd, event);
                });
                LRESULT(0)
            }

            WM_MOUSEMOVE => {
                Self::with_state(|state| {
                    let point = state.desktop_point(lparam);
                    let event = SelectionEvent::PointerMoved {
                        position: PointerPosition::Physical(point),
                        modifiers: current_modifiers(),
                    };
                    state.dispatch(hwnd, event);
                    state.track_pointer(point);
                });
                LRESULT(0)
            }

            WM_TIMER if wparam.0 == MAGNIFIER_TIMER => {
                Self::with_state(|state| state.show_magnifier_frame(hwnd));
                LRESULT(0)
            }

            WM_LBUTTONUP => {
                Self::with_state(|state| {
                    let event = SelectionEvent::PointerReleased {
                        position: state.pointer(lparam),
                        button: PointerButton::Primary,
                        modifiers: current_modifiers(),
                    };
                    state.dispatch(hwnd, event);
                });
                let _ = ReleaseCapture();
                LRESULT(0)
            }

            WM_KEYDOWN | WM_SYSKEYDOWN | WM_KEYUP | WM_SYSKEYUP => {
                let vk = wparam.0 as u16;
                let is_down = msg == WM_KEYDOWN || msg == WM_SYSKEYDOWN;

                if is_modifier(vk) {
                    Self::with_state(|state| {
                        state.dispatch(hwnd, SelectionEvent::ModifiersChanged(current_modifiers()));
                    });
                } else if is_down {
                    if let Some(key) = map_key(vk) {
                        Self::with_state(|state| {
                            let event = SelectionEvent::KeyPressed {
                                key,
                                modifiers: current_modifiers(),
                            };
                            state.dispatch(hwnd, event);
                        });
                    }
                }

                // Swallowed so Alt does not open the system menu.
                LRESULT(0)
            }

            WM_CLOSE => {
                Self::with_state(|state| state.closed = true);
                LRESULT(0)
            }

            WM_DESTROY => LRESULT(0),

            _ => DefWindowProcW(hwnd, msg, wparam, lparam),
        }
    }
}

fn is_modifier(vk: u16) -> bool {
    vk == VK_SHIFT.0 || vk == VK_CONTROL.0 || vk == VK_MENU.0
}

fn current_modifiers() -> Modifiers {
    let down = |vk: u16| unsafe { GetKeyState(i32::from(vk)) } < 0;
    Modifiers {
        shift: down(VK_SHIFT.0),
        ctrl: down(VK_CONTROL.0),
        alt: down(VK_MENU.0),
    }
}

fn map_key(vk: u16) -> Option<Key> {
    match vk {
        v if v == VK_ESCAPE.0 => Some(Key::Escape),
        v if v == VK_RETURN.0 => Some(Key::Enter),
        v if v == VK_OEM_3.0 => Some(Key::Backtick),
        v if v == VK_LEFT.0 => Some(Key::Left),
        v if v == VK_RIGHT.0 => Some(Key::Right),
        v if v == VK_UP.0 => Some(Key::Up),
        v if v == VK_DOWN.0 => Some(Key::Down),
        0x30..=0x39 => Some(Key::Digit((vk - 0x30) as u8)),
        v if (VK_NUMPAD0.0..=VK_NUMPAD9.0).contains(&v) => Some(Key::Digit((v - VK_NUMPAD0.0) as u8)),
        _ => None,
    }
}
