//! Initial stack frame of a new thread.
//!
//! The context switch saves callee-saved registers on the outgoing stack and
//! `ret`s on the incoming one. A thread that has never run has no such
//! frame, so we forge one: six register slots and a return address pointing
//! at the first-entry trampoline. The trampoline finds the boot function in
//! `r12` and its argument in `r13`.
//!
//! Layout, growing down from `stack_top`:
//!   [top - 8]  rip → trampoline
//!   [top - 16] rbp
//!   [top - 24] rbx
//!   [top - 32] r12 = boot function
//!   [top - 40] r13 = argument
//!   [top - 48] r14
//!   [top - 56] r15   ← saved stack pointer

use super::BootFn;

/// Number of machine words in the forged frame.
pub const FRAME_WORDS: usize = 7;

/// Slot indices, counted from the saved stack pointer upwards.
pub const SLOT_R13: usize = 2;
pub const SLOT_R12: usize = 3;
pub const SLOT_RIP: usize = 6;

/// Writes the first-switch frame below `stack_top` and returns the stack
/// pointer to store in the new thread's `Context`.
///
/// Once the switch pops the six registers and returns, the stack pointer
/// sits exactly at `stack_top`, so a 16-byte aligned top keeps the System V
/// call alignment for the `call` the trampoline makes.
///
/// # Safety
/// `stack_top` must be 16-byte aligned and the `FRAME_WORDS` words below it
/// must be writable.
pub unsafe fn write_initial_frame(
    stack_top: usize,
    trampoline: usize,
    boot: BootFn,
    arg: usize,
) -> usize {
    debug_assert_eq!(stack_top % 16, 0, "unaligned stack top {:#x}", stack_top);

    let sp = stack_top - FRAME_WORDS * core::mem::size_of::<usize>();
    let slots = sp as *mut usize;

    // SAFETY: the caller guarantees the frame area is writable.
    unsafe {
        for i in 0..FRAME_WORDS {
            slots.add(i).write(0);
        }
        slots.add(SLOT_R13).write(arg);
        slots.add(SLOT_R12).write(boot as usize);
        slots.add(SLOT_RIP).write(trampoline);
    }
    sp
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C-unwind" fn never(_: usize) -> ! {
        unreachable!()
    }

    #[repr(C, align(16))]
    struct Stack([usize; 16]);

    #[test]
    fn test_frame_layout() {
        let mut stack = Stack([usize::MAX; 16]);
        let top = stack.0.as_mut_ptr() as usize + core::mem::size_of::<Stack>();

        let sp = unsafe { write_initial_frame(top, 0x1234, never, 0xfeed) };

        assert_eq!(top - sp, FRAME_WORDS * core::mem::size_of::<usize>());
        let frame = &stack.0[16 - FRAME_WORDS..];
        assert_eq!(frame[SLOT_RIP], 0x1234);
        assert_eq!(frame[SLOT_R12], never as usize);
        assert_eq!(frame[SLOT_R13], 0xfeed);
        for (i, word) in frame.iter().enumerate() {
            if ![SLOT_RIP, SLOT_R12, SLOT_R13].contains(&i) {
                assert_eq!(*word, 0, "slot {} not cleared", i);
            }
        }
        // Words above the frame are untouched.
        assert!(stack.0[..16 - FRAME_WORDS].iter().all(|w| *w == usize::MAX));
    }
}
