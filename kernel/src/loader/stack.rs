//! Initial user stack construction
//!
//! Builds the argv block a fresh process finds above its stack pointer:
//! the program name and argument strings, a null-terminated pointer
//! array over them, `argv`, `argc`, and a null return address. The block
//! is assembled in kernel memory and committed to the stack page in one
//! write, after both argument budgets have been checked, so an oversized
//! command line never leaves a partial stack behind.

use alloc::vec::Vec;

use crate::{
    error::StackError,
    mm::{VirtualAddress, PAGE_SIZE},
};

/// Budget for argument string bytes, terminators included.
pub const ARG_BYTES_MAX: usize = 2048;
/// Budget for argument count, the program name included.
pub const ARG_COUNT_MAX: usize = 128;

// Worst case: max string bytes, 7 alignment fill bytes, a full pointer
// array with its null, then argv, argc, and the return slot.
const _: () = assert!(ARG_BYTES_MAX + 7 + (ARG_COUNT_MAX + 1) * 8 + 24 <= PAGE_SIZE);

/// A finished argv block, spanning `initial_sp..stack_top`.
pub struct StackImage {
    bytes: Vec<u8>,
    initial_sp: VirtualAddress,
}

impl StackImage {
    /// Where the user stack pointer starts; the low end of the block.
    pub fn initial_sp(&self) -> VirtualAddress {
        self.initial_sp
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Build the argv block for `name` and whitespace-separated `raw_args`,
/// laid out downward from `stack_top`.
///
/// Layout, from the top down: the strings (name first), padding to an
/// 8-byte boundary, the pointer array with its null terminator, the
/// `argv` pointer, `argc` as a full word, and a null return address at
/// the final stack pointer.
pub fn build(
    stack_top: VirtualAddress,
    name: &str,
    raw_args: &str,
) -> Result<StackImage, StackError> {
    let tokens: Vec<&str> = raw_args.split_ascii_whitespace().collect();
    let argc = 1 + tokens.len();
    let string_bytes =
        name.len() + 1 + tokens.iter().map(|t| t.len() + 1).sum::<usize>();
    if argc > ARG_COUNT_MAX || string_bytes > ARG_BYTES_MAX {
        return Err(StackError::ArgumentsTooLarge);
    }

    let top = stack_top.as_u64();
    let aligned = (top - string_bytes as u64) & !7;
    let array_base = aligned - 8 * (argc as u64 + 1);
    let initial_sp = array_base - 24;

    let mut bytes = alloc::vec![0u8; (top - initial_sp) as usize];
    let idx = |addr: u64| (addr - initial_sp) as usize;

    // Strings, name first, packed downward from the top. Terminators are
    // the buffer's own zero fill.
    let mut cursor = top;
    let mut argv = Vec::with_capacity(argc);
    for arg in core::iter::once(name).chain(tokens.iter().copied()) {
        cursor -= arg.len() as u64 + 1;
        argv.push(cursor);
        bytes[idx(cursor)..idx(cursor) + arg.len()].copy_from_slice(arg.as_bytes());
    }

    // Pointer array; the null entry at argv[argc] is already zero.
    for (i, addr) in argv.iter().enumerate() {
        let at = idx(array_base + 8 * i as u64);
        bytes[at..at + 8].copy_from_slice(&addr.to_le_bytes());
    }

    let mut put = |addr: u64, value: u64| {
        let at = idx(addr);
        bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
    };
    put(array_base - 8, array_base); // char **argv
    put(array_base - 16, argc as u64); // argc, widened to a word
    // The null return address at initial_sp is already zero.

    Ok(StackImage {
        bytes,
        initial_sp: VirtualAddress::new(initial_sp),
    })
}
