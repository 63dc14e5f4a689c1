//! Millisecond time base
//!
//! The engine never sleeps; it only reads a free-running millisecond counter
//! that wraps at `u32::MAX`. All comparisons go through the helpers below.

/// Free-running millisecond counter
pub trait Clock {
    /// Current time in milliseconds, wrapping
    fn now_ms(&self) -> u32;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

/// Longest delay a deadline can be set ahead of now
pub const MAX_DELAY_MS: u32 = i32::MAX as u32;

/// Milliseconds from `since` to `now`
pub fn elapsed_ms(since: u32, now: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Signed distance from `now` to `deadline`; negative once it has passed
pub fn until_ms(deadline: u32, now: u32) -> i32 {
    deadline.wrapping_sub(now) as i32
}
