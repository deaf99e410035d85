//! Direct3D 11 Present hook and window procedure replacement

use super::frame::key_label;
use super::input::{InputEvent, Verdict};
use super::renderer::Renderer;
use super::{callbacks, CAPTURE, EVENTS, PRESENT_VTABLE_INDEX};
use crate::error::{Error, Result};
use crate::hook::engine;
use imgui::{Condition, ConfigFlags, Context, Io, Key, MouseButton, StyleColor};
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{error, info, warn};
use widestring::U16CString;
use windows::core::{w, Interface, HRESULT, PCWSTR};
use windows::Win32::Foundation::{HMODULE, HWND, LPARAM, LRESULT, RECT, WPARAM};
use windows::Win32::Graphics::Direct3D::{D3D_DRIVER_TYPE_HARDWARE, D3D_FEATURE_LEVEL, D3D_FEATURE_LEVEL_11_0};
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDeviceAndSwapChain, ID3D11Device, ID3D11DeviceContext, ID3D11RenderTargetView, ID3D11Texture2D,
    D3D11_CREATE_DEVICE_FLAG, D3D11_SDK_VERSION,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_MODE_DESC, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::{
    IDXGISwapChain, DXGI_SWAP_CHAIN_DESC, DXGI_SWAP_EFFECT_DISCARD, DXGI_USAGE_RENDER_TARGET_OUTPUT,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CallWindowProcW, CreateWindowExW, DefWindowProcW, DestroyWindow, GetClientRect, GetDesktopWindow,
    RegisterClassExW, SetWindowLongPtrW, UnregisterClassW, GWLP_WNDPROC, WINDOW_EX_STYLE, WNDCLASSEXW, WNDPROC,
    WS_OVERLAPPEDWINDOW,
};

type PresentFn = unsafe extern "system" fn(*mut c_void, u32, u32) -> HRESULT;

static ORIGINAL_PRESENT: AtomicUsize = AtomicUsize::new(0);
static WINDOW: AtomicIsize = AtomicIsize::new(0);
static ORIGINAL_WNDPROC: AtomicIsize = AtomicIsize::new(0);
static SETUP_FAILED: AtomicBool = AtomicBool::new(false);
static FRAME: Mutex<Option<FrameState>> = Mutex::new(None);

pub fn module_loaded(name: &str) -> bool {
    match U16CString::from_str(name) {
        Ok(wide) => unsafe { GetModuleHandleW(PCWSTR(wide.as_ptr())) }.is_ok(),
        Err(_) => false,
    }
}

/// Build a throwaway device and swap chain on `window` and read Present out
/// of its vtable. Feature level 11_0 is tried first, then the runtime default.
fn present_from_dummy(window: HWND, label: &str) -> Option<usize> {
    let levels = [D3D_FEATURE_LEVEL_11_0];
    for attempt in 0..2 {
        let requested: Option<&[D3D_FEATURE_LEVEL]> = if attempt == 0 { Some(&levels) } else { None };
        let desc = DXGI_SWAP_CHAIN_DESC {
            BufferDesc: DXGI_MODE_DESC {
                Format: DXGI_FORMAT_R8G8B8A8_UNORM,
                ..Default::default()
            },
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: 1,
            OutputWindow: window,
            Windowed: true.into(),
            SwapEffect: DXGI_SWAP_EFFECT_DISCARD,
            Flags: 0,
        };
        let mut swap_chain: Option<IDXGISwapChain> = None;
        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;
        let mut level = D3D_FEATURE_LEVEL::default();
        let result = unsafe {
            D3D11CreateDeviceAndSwapChain(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_FLAG(0),
                requested,
                D3D11_SDK_VERSION,
                Some(&desc),
                Some(&mut swap_chain),
                Some(&mut device),
                Some(&mut level),
                Some(&mut context),
            )
        };
        match (result, swap_chain) {
            (Ok(()), Some(swap_chain)) => {
                let present = unsafe {
                    let vtable = *(swap_chain.as_raw() as *const *const usize);
                    *vtable.add(PRESENT_VTABLE_INDEX)
                };
                info!(
                    "[{}] Dummy swap chain created (attempt {}, feature level 0x{:X}), Present at 0x{:X}",
                    label,
                    attempt + 1,
                    level.0,
                    present
                );
                return Some(present);
            }
            (Err(e), _) => warn!(
                "[{}] D3D11CreateDeviceAndSwapChain failed (attempt {}, {}): {}",
                label,
                attempt + 1,
                if attempt == 0 { "11_0 explicit" } else { "runtime default" },
                e
            ),
            (Ok(()), None) => warn!("[{}] D3D11CreateDeviceAndSwapChain returned no swap chain", label),
        }
    }
    None
}

unsafe extern "system" fn dummy_wndproc(window: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    DefWindowProcW(window, msg, wparam, lparam)
}

fn present_from_hidden_window() -> Option<usize> {
    let class = w!("MDB_DummyDX11Wnd");
    let instance = unsafe { GetModuleHandleW(None) }.ok()?;
    let wc = WNDCLASSEXW {
        cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
        lpfnWndProc: Some(dummy_wndproc),
        hInstance: instance.into(),
        lpszClassName: class,
        ..Default::default()
    };
    // a class left over from an earlier attempt is fine
    unsafe { RegisterClassExW(&wc) };
    let window = unsafe {
        CreateWindowExW(
            WINDOW_EX_STYLE(0),
            class,
            w!(""),
            WS_OVERLAPPEDWINDOW,
            0,
            0,
            100,
            100,
            None,
            None,
            instance,
            None,
        )
    };
    let present = match window {
        Ok(window) => {
            let present = present_from_dummy(window, "hidden window");
            let _ = unsafe { DestroyWindow(window) };
            present
        }
        Err(e) => {
            error!("CreateWindowExW failed: {}", e);
            None
        }
    };
    let _ = unsafe { UnregisterClassW(class, instance) };
    present
}

/// Locate Present and detour it. Returns the hook handle.
pub fn install() -> Result<i64> {
    let present = present_from_dummy(unsafe { GetDesktopWindow() }, "desktop window")
        .or_else(|| {
            warn!("Desktop window swap chain failed, trying a hidden window");
            present_from_hidden_window()
        })
        .ok_or_else(|| {
            Error::InitFailed("could not create a Direct3D 11 swap chain to locate Present".to_string())
        })?;

    let (handle, trampoline) = engine()
        .install(present, hooked_present as usize, "IDXGISwapChain::Present")
        .map_err(|e| {
            error!(
                "Present hook failed: {}. Another overlay may already have hooked Present.",
                e
            );
            e
        })?;
    ORIGINAL_PRESENT.store(trampoline, Ordering::Release);
    info!("Present hook installed");
    Ok(handle)
}

fn original_present() -> PresentFn {
    // stored right after the hook is enabled
    let address = loop {
        let address = ORIGINAL_PRESENT.load(Ordering::Acquire);
        if address != 0 {
            break address;
        }
        std::hint::spin_loop();
    };
    unsafe { std::mem::transmute::<usize, PresentFn>(address) }
}

unsafe extern "system" fn hooked_present(swap_chain: *mut c_void, sync_interval: u32, flags: u32) -> HRESULT {
    if let Some(chain) = IDXGISwapChain::from_raw_borrowed(&swap_chain) {
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| render_frame(chain))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Overlay frame failed: {}", e),
            Err(_) => error!("Overlay frame panicked"),
        }
    }
    original_present()(swap_chain, sync_interval, flags)
}

struct FrameState {
    imgui: Context,
    renderer: Renderer,
    context: ID3D11DeviceContext,
    target: Option<ID3D11RenderTargetView>,
    window: HWND,
    last_frame: Instant,
}

// Only touched under the FRAME lock.
unsafe impl Send for FrameState {}

fn dx(what: &'static str) -> impl Fn(windows::core::Error) -> Error {
    move |e| Error::InitFailed(format!("{}: {}", what, e))
}

fn render_frame(swap_chain: &IDXGISwapChain) -> Result<()> {
    let mut frame = FRAME.lock().unwrap_or_else(|e| e.into_inner());
    if frame.is_none() {
        if SETUP_FAILED.load(Ordering::Relaxed) {
            return Ok(());
        }
        match setup(swap_chain) {
            Ok(state) => {
                *frame = Some(state);
                CAPTURE.initialized.store(true, Ordering::Release);
                info!("Overlay initialized");
            }
            Err(e) => {
                SETUP_FAILED.store(true, Ordering::Relaxed);
                return Err(e);
            }
        }
    }
    match frame.as_mut() {
        Some(state) => state.draw(),
        None => Ok(()),
    }
}

/// First Present: capture the real device, context and window, replace the
/// window procedure and bring up the UI context.
fn setup(swap_chain: &IDXGISwapChain) -> Result<FrameState> {
    let device: ID3D11Device = unsafe { swap_chain.GetDevice() }.map_err(dx("GetDevice"))?;
    let context = unsafe { device.GetImmediateContext() }.map_err(dx("GetImmediateContext"))?;
    let desc = unsafe { swap_chain.GetDesc() }.map_err(dx("GetDesc"))?;
    let window = desc.OutputWindow;

    let mut imgui = Context::create();
    imgui.set_ini_filename(None);
    imgui.set_platform_name(Some(format!("mdb_bridge-win32 {}", env!("CARGO_PKG_VERSION"))));
    imgui.io_mut().config_flags |= ConfigFlags::NAV_ENABLE_KEYBOARD;
    apply_style(&mut imgui);

    let renderer = Renderer::new(&device, &mut imgui)?;
    let back_buffer: ID3D11Texture2D = unsafe { swap_chain.GetBuffer(0) }.map_err(dx("GetBuffer"))?;
    let mut target = None;
    unsafe { device.CreateRenderTargetView(&back_buffer, None, Some(&mut target)) }
        .map_err(dx("CreateRenderTargetView"))?;

    replace_wndproc(window);

    Ok(FrameState {
        imgui,
        renderer,
        context,
        target,
        window,
        last_frame: Instant::now(),
    })
}

fn apply_style(imgui: &mut Context) {
    let style = imgui.style_mut();
    style.use_dark_colors();
    style.window_rounding = 0.0;
    style.frame_rounding = 0.0;
    style.scrollbar_rounding = 0.0;
    style[StyleColor::WindowBg] = [0.065, 0.065, 0.065, 1.0];
    style[StyleColor::TitleBg] = [0.1, 0.1, 0.1, 1.0];
    style[StyleColor::TitleBgActive] = [0.15, 0.15, 0.15, 1.0];
    style[StyleColor::FrameBg] = [0.1, 0.1, 0.1, 1.0];
    style[StyleColor::Button] = [0.2, 0.2, 0.2, 1.0];
    style[StyleColor::ButtonHovered] = [0.3, 0.3, 0.3, 1.0];
    style[StyleColor::Header] = [0.1, 0.3, 0.3, 1.0];
    style[StyleColor::HeaderHovered] = [0.15, 0.4, 0.4, 1.0];
}

impl FrameState {
    fn draw(&mut self) -> Result<()> {
        let now = Instant::now();
        let io = self.imgui.io_mut();
        io.update_delta_time(now - self.last_frame);
        self.last_frame = now;

        let mut rect = RECT::default();
        if unsafe { GetClientRect(self.window, &mut rect) }.is_ok() {
            io.display_size = [(rect.right - rect.left) as f32, (rect.bottom - rect.top) as f32];
        }
        for event in EVENTS.drain() {
            feed(io, event);
        }

        let ui = self.imgui.new_frame();
        if !callbacks::run_frame() && CAPTURE.input_enabled.load(Ordering::Relaxed) {
            ui.window("MDB Explorer")
                .position([10.0, 10.0], Condition::FirstUseEver)
                .always_auto_resize(true)
                .build(|| {
                    let key = CAPTURE.toggle_key.load(Ordering::Relaxed);
                    ui.text("Overlay initialized");
                    ui.text(format!("Press {} to toggle input capture", key_label(key)));
                    ui.text("Waiting for a draw callback...");
                });
        }

        let draw_data = self.imgui.render();
        unsafe { self.context.OMSetRenderTargets(Some(&[self.target.clone()]), None) };
        self.renderer.render(&self.context, draw_data)?;

        let io = self.imgui.io();
        CAPTURE.want_mouse.store(io.want_capture_mouse, Ordering::Relaxed);
        CAPTURE.want_keyboard.store(io.want_capture_keyboard, Ordering::Relaxed);
        Ok(())
    }
}

fn feed(io: &mut Io, event: InputEvent) {
    match event {
        InputEvent::MousePos(x, y) => io.add_mouse_pos_event([x, y]),
        InputEvent::MouseButton(index, down) => {
            let button = match index {
                0 => MouseButton::Left,
                1 => MouseButton::Right,
                2 => MouseButton::Middle,
                3 => MouseButton::Extra1,
                _ => MouseButton::Extra2,
            };
            io.add_mouse_button_event(button, down);
        }
        InputEvent::Wheel { horizontal, delta } => {
            if horizontal {
                io.add_mouse_wheel_event([delta, 0.0]);
            } else {
                io.add_mouse_wheel_event([0.0, delta]);
            }
        }
        InputEvent::Char(c) => io.add_input_character(c),
        InputEvent::Key { vk, down } => {
            if let Some(modifier) = modifier_key(vk) {
                io.add_key_event(modifier, down);
            }
            if let Some(key) = map_key(vk) {
                io.add_key_event(key, down);
            }
        }
    }
}

fn modifier_key(vk: u32) -> Option<Key> {
    match vk {
        0x10 => Some(Key::ModShift),
        0x11 => Some(Key::ModCtrl),
        0x12 => Some(Key::ModAlt),
        _ => None,
    }
}

fn map_key(vk: u32) -> Option<Key> {
    Some(match vk {
        0x08 => Key::Backspace,
        0x09 => Key::Tab,
        0x0D => Key::Enter,
        0x10 => Key::LeftShift,
        0x11 => Key::LeftCtrl,
        0x12 => Key::LeftAlt,
        0x1B => Key::Escape,
        0x20 => Key::Space,
        0x21 => Key::PageUp,
        0x22 => Key::PageDown,
        0x23 => Key::End,
        0x24 => Key::Home,
        0x25 => Key::LeftArrow,
        0x26 => Key::UpArrow,
        0x27 => Key::RightArrow,
        0x28 => Key::DownArrow,
        0x2D => Key::Insert,
        0x2E => Key::Delete,
        0x41 => Key::A,
        0x43 => Key::C,
        0x56 => Key::V,
        0x58 => Key::X,
        0x59 => Key::Y,
        0x5A => Key::Z,
        _ => return None,
    })
}

unsafe extern "system" fn overlay_wndproc(window: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if CAPTURE.handle(&EVENTS, msg, wparam.0, lparam.0) == Verdict::Swallow {
        return LRESULT(1);
    }
    let original: WNDPROC = std::mem::transmute::<isize, WNDPROC>(ORIGINAL_WNDPROC.load(Ordering::Acquire));
    CallWindowProcW(original, window, msg, wparam, lparam)
}

fn replace_wndproc(window: HWND) {
    let previous = unsafe { SetWindowLongPtrW(window, GWLP_WNDPROC, overlay_wndproc as usize as isize) };
    ORIGINAL_WNDPROC.store(previous, Ordering::Release);
    WINDOW.store(window.0 as isize, Ordering::Release);
    info!("Window procedure replaced on {:p}", window.0);
}

/// Restore the window procedure and drop the UI context and renderer.
pub fn teardown() {
    let window = WINDOW.swap(0, Ordering::AcqRel);
    let original = ORIGINAL_WNDPROC.swap(0, Ordering::AcqRel);
    if window != 0 && original != 0 {
        unsafe { SetWindowLongPtrW(HWND(window as *mut c_void), GWLP_WNDPROC, original) };
        info!("Window procedure restored");
    }
    *FRAME.lock().unwrap_or_else(|e| e.into_inner()) = None;
    SETUP_FAILED.store(false, Ordering::Relaxed);
}
