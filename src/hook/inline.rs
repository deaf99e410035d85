//! Inline x86-64 detours
//!
//! The target's first instructions are moved into a trampoline next to it and
//! replaced by a jump to the detour. The trampoline runs the moved
//! instructions and jumps back to the rest of the original function.

use super::memory::{alloc_near, write_code, ExecBuffer};
use super::{Detour, DetourBackend};
use crate::error::{Error, Result};
use iced_x86::{
    BlockEncoder, BlockEncoderOptions, Decoder, DecoderOptions, FlowControl, Instruction, InstructionBlock,
};

pub const NEAR_JUMP_LEN: usize = 5;
pub const ABS_JUMP_LEN: usize = 14;

/// Bytes read from the target when looking for whole instructions.
const PROLOGUE_WINDOW: usize = 32;
const TRAMPOLINE_SIZE: usize = 128;

/// `jmp` from `from` to `to`: `E9 rel32` when in range, otherwise
/// `FF 25 00000000` followed by the absolute address.
pub fn jump_bytes(from: usize, to: usize) -> Vec<u8> {
    let rel = (to as i64).wrapping_sub(from as i64 + NEAR_JUMP_LEN as i64);
    match i32::try_from(rel) {
        Ok(rel32) => {
            let mut code = vec![0xE9];
            code.extend_from_slice(&rel32.to_le_bytes());
            code
        }
        Err(_) => abs_jump(to),
    }
}

pub fn abs_jump(to: usize) -> Vec<u8> {
    let mut code = vec![0xFF, 0x25, 0, 0, 0, 0];
    code.extend_from_slice(&(to as u64).to_le_bytes());
    code
}

fn is_padding(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| matches!(b, 0xCC | 0x90 | 0x00))
}

#[derive(Debug, Clone)]
pub struct Relocated {
    /// Re-encoded instructions for the trampoline address
    pub code: Vec<u8>,
    /// Bytes of whole instructions taken from the target
    pub consumed: usize,
    /// The function returned or jumped away before `min_len` bytes
    pub ends_early: bool,
}

/// Re-encode the whole instructions covering the first `min_len` bytes of
/// `code` (located at `from`) so they run at `to`.
pub fn relocate(code: &[u8], from: u64, to: u64, min_len: usize) -> Result<Relocated> {
    let mut decoder = Decoder::with_ip(64, code, from, DecoderOptions::NONE);
    let mut taken: Vec<Instruction> = Vec::new();
    let mut consumed = 0usize;
    let mut ends_early = false;

    while consumed < min_len {
        if !decoder.can_decode() {
            return Err(Error::HookInstallFailed(format!(
                "prologue at 0x{:X} shorter than {} bytes",
                from, min_len
            )));
        }
        let instr = decoder.decode();
        if instr.is_invalid() {
            return Err(Error::HookInstallFailed(format!(
                "undecodable instruction at 0x{:X}",
                instr.ip()
            )));
        }
        consumed += instr.len();
        taken.push(instr);

        let terminal = matches!(
            instr.flow_control(),
            FlowControl::Return | FlowControl::UnconditionalBranch | FlowControl::IndirectBranch
        );
        if terminal && consumed < min_len {
            let rest = &code[consumed..min_len.min(code.len())];
            if !is_padding(rest) {
                return Err(Error::HookInstallFailed(format!(
                    "function at 0x{:X} is shorter than the patch",
                    from
                )));
            }
            ends_early = true;
            break;
        }
    }

    let block = InstructionBlock::new(&taken, to);
    let encoded = BlockEncoder::encode(64, block, BlockEncoderOptions::NONE)
        .map_err(|e| Error::HookInstallFailed(format!("relocating 0x{:X}: {}", from, e)))?;
    Ok(Relocated {
        code: encoded.code_buffer,
        consumed,
        ends_early,
    })
}

/// One patched function.
#[derive(Debug)]
pub struct InlineDetour {
    target: usize,
    trampoline: ExecBuffer,
    original: Vec<u8>,
    patch: Vec<u8>,
    enabled: bool,
}

impl InlineDetour {
    /// Build the trampoline and the patch without touching the target.
    ///
    /// # Safety
    /// `target` must be the entry of a function with at least
    /// [`PROLOGUE_WINDOW`] readable bytes.
    pub unsafe fn prepare(target: usize, detour: usize) -> Result<Self> {
        let mut trampoline = alloc_near(target, TRAMPOLINE_SIZE)?;
        let jump = jump_bytes(target, detour);

        let window = std::slice::from_raw_parts(target as *const u8, PROLOGUE_WINDOW);
        let relocated = relocate(window, target as u64, trampoline.addr() as u64, jump.len())?;

        let mut body = relocated.code;
        if !relocated.ends_early {
            body.extend_from_slice(&abs_jump(target + relocated.consumed));
        }
        trampoline.fill(&body)?;

        let patch_len = relocated.consumed.max(jump.len());
        let original = window[..patch_len].to_vec();
        let mut patch = jump;
        patch.resize(patch_len, 0xCC);

        Ok(InlineDetour {
            target,
            trampoline,
            original,
            patch,
            enabled: false,
        })
    }
}

impl Detour for InlineDetour {
    fn trampoline(&self) -> usize {
        self.trampoline.addr()
    }

    fn enable(&mut self) -> Result<()> {
        if !self.enabled {
            unsafe { write_code(self.target, &self.patch)? };
            self.enabled = true;
        }
        Ok(())
    }

    fn disable(&mut self) -> Result<()> {
        if self.enabled {
            unsafe { write_code(self.target, &self.original)? };
            self.enabled = false;
        }
        Ok(())
    }
}

impl Drop for InlineDetour {
    fn drop(&mut self) {
        if let Err(e) = self.disable() {
            tracing::error!("Could not restore 0x{:X}: {}", self.target, e);
        }
    }
}

/// Patches code in the current process.
#[derive(Debug, Default)]
pub struct InlinePatcher;

impl DetourBackend for InlinePatcher {
    fn create(&mut self, target: usize, detour: usize) -> Result<Box<dyn Detour>> {
        let hook = unsafe { InlineDetour::prepare(target, detour)? };
        Ok(Box::new(hook))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jump_encoding() {
        assert_eq!(jump_bytes(0x1000, 0x2000), vec![0xE9, 0xFB, 0x0F, 0x00, 0x00]);
        assert_eq!(jump_bytes(0x2000, 0x1000), vec![0xE9, 0xFB, 0xEF, 0xFF, 0xFF]);

        let far = jump_bytes(0x1000, 0x7FF6_0000_0000);
        assert_eq!(far.len(), ABS_JUMP_LEN);
        assert_eq!(&far[..6], &[0xFF, 0x25, 0, 0, 0, 0]);
        assert_eq!(u64::from_le_bytes(far[6..].try_into().unwrap()), 0x7FF6_0000_0000);
    }

    #[test]
    fn test_rip_relative_operand_keeps_its_target() {
        // mov rax, [rip+0x10]; add rax, 1; ret
        let code = [0x48, 0x8B, 0x05, 0x10, 0, 0, 0, 0x48, 0x83, 0xC0, 0x01, 0xC3];
        let from = 0x1000_0000u64;
        let to = 0x1000_8000u64;
        let relocated = relocate(&code, from, to, NEAR_JUMP_LEN).unwrap();
        assert_eq!(relocated.consumed, 7);
        assert!(!relocated.ends_early);

        let mut decoder = Decoder::with_ip(64, &relocated.code, to, DecoderOptions::NONE);
        let moved = decoder.decode();
        assert!(moved.is_ip_rel_memory_operand());
        assert_eq!(moved.ip_rel_memory_address(), from + 7 + 0x10);
    }

    #[test]
    fn test_short_branch_is_widened() {
        // jz +0x20; nop x4
        let code = [0x74, 0x20, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90];
        let from = 0x4000_0000u64;
        let relocated = relocate(&code, from, 0x4100_0000, NEAR_JUMP_LEN).unwrap();

        let mut decoder = Decoder::with_ip(64, &relocated.code, 0x4100_0000, DecoderOptions::NONE);
        let branch = decoder.decode();
        assert_eq!(branch.near_branch_target(), from + 2 + 0x20);
    }

    #[test]
    fn test_too_short_function_is_rejected() {
        // ret followed by the next function's prologue
        let code = [0xC3, 0x48, 0x89, 0x5C, 0x24, 0x08, 0x90, 0x90];
        assert!(relocate(&code, 0x1000, 0x2000, NEAR_JUMP_LEN).is_err());

        // ret followed by int3 padding
        let padded = [0xC3, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC];
        let relocated = relocate(&padded, 0x1000, 0x2000, NEAR_JUMP_LEN).unwrap();
        assert!(relocated.ends_early);
        assert_eq!(relocated.code, vec![0xC3]);
    }
}
