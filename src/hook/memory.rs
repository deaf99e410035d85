//! Executable memory for trampolines and writes into protected code pages

use crate::error::{Error, Result};

/// Largest distance a `jmp rel32` or RIP-relative operand can reach.
pub const REL32_RANGE: usize = 0x7FFF_0000;

const PROBE_STEP: usize = 0x0100_0000;

/// An executable buffer owned by one hook.
#[derive(Debug)]
pub struct ExecBuffer {
    addr: usize,
    len: usize,
}

impl ExecBuffer {
    pub fn addr(&self) -> usize {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `code` to the start of the buffer.
    pub fn fill(&mut self, code: &[u8]) -> Result<()> {
        if code.len() > self.len {
            return Err(Error::BufferTooSmall {
                needed: code.len(),
                available: self.len,
            });
        }
        unsafe { std::ptr::copy_nonoverlapping(code.as_ptr(), self.addr as *mut u8, code.len()) };
        os::flush(self.addr, code.len());
        Ok(())
    }
}

impl Drop for ExecBuffer {
    fn drop(&mut self) {
        os::free(self.addr, self.len);
    }
}

pub fn within_rel32(a: usize, b: usize) -> bool {
    a.abs_diff(b) < REL32_RANGE
}

/// Candidate addresses around `near`, closest first, alternating below and above.
fn probe_addresses(near: usize, granularity: usize) -> impl Iterator<Item = usize> {
    let steps = REL32_RANGE / PROBE_STEP;
    (1..steps).flat_map(move |i| {
        let delta = i * PROBE_STEP;
        let below = near.checked_sub(delta).map(|a| a & !(granularity - 1));
        let above = near.checked_add(delta).map(|a| a & !(granularity - 1));
        below.into_iter().chain(above)
    })
}

/// Allocate `len` executable bytes within rel32 reach of `near`, falling back
/// to anywhere in the address space.
pub fn alloc_near(near: usize, len: usize) -> Result<ExecBuffer> {
    let len = len.max(1);
    for candidate in probe_addresses(near, os::granularity()) {
        if candidate == 0 {
            continue;
        }
        if let Some(addr) = os::alloc_at(candidate, len) {
            if within_rel32(addr, near) {
                return Ok(ExecBuffer { addr, len });
            }
            os::free(addr, len);
        }
    }
    tracing::warn!("No executable memory near 0x{:X}, allocating anywhere", near);
    os::alloc_at(0, len)
        .map(|addr| ExecBuffer { addr, len })
        .ok_or_else(|| Error::AllocationFailed(format!("{} bytes of executable memory", len)))
}

/// Overwrite `bytes.len()` bytes of code at `addr`, restoring the page
/// protection afterwards.
///
/// # Safety
/// `addr` must point at mapped code no other thread is executing through
/// the patched range.
pub unsafe fn write_code(addr: usize, bytes: &[u8]) -> Result<()> {
    if addr == 0 {
        return Err(Error::NullPointer("code address"));
    }
    os::write(addr, bytes)?;
    os::flush(addr, bytes.len());
    Ok(())
}

#[cfg(windows)]
mod os {
    use crate::error::{Error, Result};
    use std::ffi::c_void;
    use windows::Win32::System::Diagnostics::Debug::FlushInstructionCache;
    use windows::Win32::System::Memory::{
        VirtualAlloc, VirtualFree, VirtualProtect, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE,
        PAGE_EXECUTE_READWRITE, PAGE_PROTECTION_FLAGS,
    };
    use windows::Win32::System::Threading::GetCurrentProcess;

    pub fn granularity() -> usize {
        0x1_0000
    }

    pub fn alloc_at(addr: usize, len: usize) -> Option<usize> {
        let hint = (addr != 0).then_some(addr as *const c_void);
        let ptr = unsafe { VirtualAlloc(hint, len, MEM_COMMIT | MEM_RESERVE, PAGE_EXECUTE_READWRITE) };
        (!ptr.is_null()).then_some(ptr as usize)
    }

    pub fn free(addr: usize, _len: usize) {
        let _ = unsafe { VirtualFree(addr as *mut c_void, 0, MEM_RELEASE) };
    }

    pub unsafe fn write(addr: usize, bytes: &[u8]) -> Result<()> {
        let mut old = PAGE_PROTECTION_FLAGS(0);
        VirtualProtect(addr as *const c_void, bytes.len(), PAGE_EXECUTE_READWRITE, &mut old)
            .map_err(|e| Error::HookInstallFailed(format!("VirtualProtect 0x{:X}: {}", addr, e)))?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
        let mut ignored = PAGE_PROTECTION_FLAGS(0);
        let _ = VirtualProtect(addr as *const c_void, bytes.len(), old, &mut ignored);
        Ok(())
    }

    pub fn flush(addr: usize, len: usize) {
        let _ = unsafe { FlushInstructionCache(GetCurrentProcess(), Some(addr as *const c_void), len) };
    }
}

#[cfg(unix)]
mod os {
    use crate::error::{Error, Result};

    fn page_size() -> usize {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            0x1000
        }
    }

    pub fn granularity() -> usize {
        page_size()
    }

    pub fn alloc_at(addr: usize, len: usize) -> Option<usize> {
        let ptr = unsafe {
            libc::mmap(
                addr as *mut libc::c_void,
                len,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        (ptr != libc::MAP_FAILED).then_some(ptr as usize)
    }

    pub fn free(addr: usize, len: usize) {
        unsafe { libc::munmap(addr as *mut libc::c_void, len) };
    }

    pub unsafe fn write(addr: usize, bytes: &[u8]) -> Result<()> {
        let page = page_size();
        let start = addr & !(page - 1);
        let span = addr + bytes.len() - start;
        let rwx = libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC;
        if libc::mprotect(start as *mut libc::c_void, span, rwx) != 0 {
            return Err(Error::HookInstallFailed(format!(
                "mprotect 0x{:X}: {}",
                addr,
                std::io::Error::last_os_error()
            )));
        }
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
        libc::mprotect(start as *mut libc::c_void, span, libc::PROT_READ | libc::PROT_EXEC);
        Ok(())
    }

    // x86 keeps instruction fetch coherent with data writes.
    pub fn flush(_addr: usize, _len: usize) {}
}
