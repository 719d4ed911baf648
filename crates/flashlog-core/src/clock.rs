#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::_rdtsc;

/// Returns a monotonic tick count with the highest resolution the
/// architecture offers.
///
/// Ticks are raw counter readings: they are comparable within one process
/// run but carry no wall-clock meaning of their own.
#[inline(always)]
pub fn ticks() -> u64 {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        _rdtsc()
    }

    #[cfg(target_arch = "aarch64")]
    unsafe {
        let value: u64;
        std::arch::asm!("mrs {}, cntvct_el0", out(reg) value);
        value
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_monotonic_enough() {
        let first = ticks();
        let second = ticks();
        assert!(second >= first);
    }
}
