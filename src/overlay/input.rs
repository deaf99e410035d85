//! Window message filtering for input capture
//!
//! The replacement window procedure asks [`filter`] whether a message goes to
//! the application. Messages the UI might use are also translated into
//! [`InputEvent`]s and queued for the render thread, which feeds them to the
//! UI context at the start of the next frame.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Mutex;

pub const WM_KEYFIRST: u32 = 0x0100;
pub const WM_KEYDOWN: u32 = 0x0100;
pub const WM_KEYUP: u32 = 0x0101;
pub const WM_CHAR: u32 = 0x0102;
pub const WM_SYSKEYDOWN: u32 = 0x0104;
pub const WM_SYSKEYUP: u32 = 0x0105;
pub const WM_KEYLAST: u32 = 0x0109;

pub const WM_MOUSEFIRST: u32 = 0x0200;
pub const WM_MOUSEMOVE: u32 = 0x0200;
pub const WM_LBUTTONDOWN: u32 = 0x0201;
pub const WM_LBUTTONUP: u32 = 0x0202;
pub const WM_LBUTTONDBLCLK: u32 = 0x0203;
pub const WM_RBUTTONDOWN: u32 = 0x0204;
pub const WM_RBUTTONUP: u32 = 0x0205;
pub const WM_RBUTTONDBLCLK: u32 = 0x0206;
pub const WM_MBUTTONDOWN: u32 = 0x0207;
pub const WM_MBUTTONUP: u32 = 0x0208;
pub const WM_MBUTTONDBLCLK: u32 = 0x0209;
pub const WM_MOUSEWHEEL: u32 = 0x020A;
pub const WM_XBUTTONDOWN: u32 = 0x020B;
pub const WM_XBUTTONUP: u32 = 0x020C;
pub const WM_XBUTTONDBLCLK: u32 = 0x020D;
pub const WM_MOUSEHWHEEL: u32 = 0x020E;
pub const WM_MOUSELAST: u32 = 0x020E;

const WHEEL_DELTA: f32 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    MousePos(f32, f32),
    /// Button index in UI order: left, right, middle, extra 1, extra 2.
    MouseButton(usize, bool),
    Wheel { horizontal: bool, delta: f32 },
    Char(char),
    Key { vk: u32, down: bool },
}

fn loword(v: usize) -> u16 {
    (v & 0xFFFF) as u16
}

fn hiword(v: usize) -> u16 {
    ((v >> 16) & 0xFFFF) as u16
}

pub fn translate(msg: u32, wparam: usize, lparam: isize) -> Option<InputEvent> {
    let button = |index, down| Some(InputEvent::MouseButton(index, down));
    match msg {
        WM_MOUSEMOVE => {
            let l = lparam as usize;
            Some(InputEvent::MousePos(loword(l) as i16 as f32, hiword(l) as i16 as f32))
        }
        WM_LBUTTONDOWN | WM_LBUTTONDBLCLK => button(0, true),
        WM_LBUTTONUP => button(0, false),
        WM_RBUTTONDOWN | WM_RBUTTONDBLCLK => button(1, true),
        WM_RBUTTONUP => button(1, false),
        WM_MBUTTONDOWN | WM_MBUTTONDBLCLK => button(2, true),
        WM_MBUTTONUP => button(2, false),
        WM_XBUTTONDOWN | WM_XBUTTONDBLCLK | WM_XBUTTONUP => {
            let index = if hiword(wparam) == 1 { 3 } else { 4 };
            button(index, msg != WM_XBUTTONUP)
        }
        WM_MOUSEWHEEL | WM_MOUSEHWHEEL => Some(InputEvent::Wheel {
            horizontal: msg == WM_MOUSEHWHEEL,
            delta: hiword(wparam) as i16 as f32 / WHEEL_DELTA,
        }),
        WM_CHAR => char::from_u32(wparam as u32)
            .filter(|c| *c != '\0')
            .map(InputEvent::Char),
        WM_KEYDOWN | WM_SYSKEYDOWN => Some(InputEvent::Key {
            vk: wparam as u32,
            down: true,
        }),
        WM_KEYUP | WM_SYSKEYUP => Some(InputEvent::Key {
            vk: wparam as u32,
            down: false,
        }),
        _ => None,
    }
}

pub fn is_mouse_message(msg: u32) -> bool {
    (WM_MOUSEFIRST..=WM_MOUSELAST).contains(&msg)
}

pub fn is_keyboard_message(msg: u32) -> bool {
    (WM_KEYFIRST..=WM_KEYLAST).contains(&msg)
}

/// Capture flags shared between the window procedure and the render thread.
#[derive(Debug)]
pub struct CaptureState {
    pub input_enabled: AtomicBool,
    pub initialized: AtomicBool,
    /// Published by the render thread after each frame.
    pub want_mouse: AtomicBool,
    pub want_keyboard: AtomicBool,
    pub toggle_key: AtomicI32,
    toggle_down: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Forward,
    Swallow,
}

impl CaptureState {
    pub const fn new(toggle_key: i32) -> Self {
        CaptureState {
            input_enabled: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
            want_mouse: AtomicBool::new(false),
            want_keyboard: AtomicBool::new(false),
            toggle_key: AtomicI32::new(toggle_key),
            toggle_down: AtomicBool::new(false),
        }
    }

    fn is_toggle(&self, wparam: usize) -> bool {
        wparam == self.toggle_key.load(Ordering::Relaxed) as usize
    }

    /// Flip input capture on the toggle key's down edge. Auto-repeat downs
    /// are ignored until the key is released.
    pub fn observe_toggle(&self, msg: u32, wparam: usize) {
        if !self.is_toggle(wparam) {
            return;
        }
        match msg {
            WM_KEYDOWN if !self.toggle_down.swap(true, Ordering::Relaxed) => {
                self.input_enabled.fetch_xor(true, Ordering::Relaxed);
            }
            WM_KEYUP => self.toggle_down.store(false, Ordering::Relaxed),
            _ => {}
        }
    }

    /// Whether `msg` stops here or reaches the application.
    pub fn filter(&self, msg: u32, wparam: usize) -> Verdict {
        if !self.input_enabled.load(Ordering::Relaxed) || !self.initialized.load(Ordering::Relaxed) {
            return Verdict::Forward;
        }
        if is_mouse_message(msg) && self.want_mouse.load(Ordering::Relaxed) {
            return Verdict::Swallow;
        }
        if is_keyboard_message(msg) && self.want_keyboard.load(Ordering::Relaxed) && !self.is_toggle(wparam) {
            return Verdict::Swallow;
        }
        Verdict::Forward
    }

    /// Full handling of one message: toggle tracking, queueing for the UI,
    /// and the forwarding decision.
    pub fn handle(&self, queue: &EventQueue, msg: u32, wparam: usize, lparam: isize) -> Verdict {
        self.observe_toggle(msg, wparam);
        if self.input_enabled.load(Ordering::Relaxed) && self.initialized.load(Ordering::Relaxed) {
            if let Some(event) = translate(msg, wparam, lparam) {
                queue.push(event);
            }
        }
        self.filter(msg, wparam)
    }
}

/// Events waiting for the next frame. Bounded so a stalled render thread
/// cannot grow it without limit.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Mutex<Vec<InputEvent>>,
}

const MAX_QUEUED: usize = 1024;

impl EventQueue {
    pub const fn new() -> Self {
        EventQueue {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, event: InputEvent) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if events.len() < MAX_QUEUED {
            events.push(event);
        }
    }

    pub fn drain(&self) -> Vec<InputEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }
}
