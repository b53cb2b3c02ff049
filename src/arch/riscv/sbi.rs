//! Minimal SBI client: only the TIME extension is used.

use core::arch::asm;

const EID_TIME: usize = 0x5449_4D45;
const FID_SET_TIMER: usize = 0;

#[inline]
fn sbi_call(eid: usize, fid: usize, arg0: usize) -> isize {
    let error: isize;
    unsafe {
        asm!(
            "ecall",
            inlateout("a0") arg0 => error,
            lateout("a1") _,
            in("a6") fid,
            in("a7") eid,
        );
    }
    error
}

/// Programs the next supervisor timer interrupt for absolute `stime`.
pub fn set_timer(stime: u64) {
    let _ = sbi_call(EID_TIME, FID_SET_TIMER, stime as usize);
}
