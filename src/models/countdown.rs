/// Projector countdown: one step per tick, wrapping back to the rotation interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
    reset_to: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Counting(u32),
    /// The countdown passed its floor of 1 and was reset; a new code should be fetched.
    Rotate,
}

impl Countdown {
    pub fn new(reset_to: u32) -> Self {
        let reset_to = reset_to.max(1);
        Self {
            remaining: reset_to,
            reset_to,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn reset_to(&self) -> u32 {
        self.reset_to
    }

    pub fn tick(&mut self) -> Tick {
        if self.remaining <= 1 {
            self.remaining = self.reset_to;
            Tick::Rotate
        } else {
            self.remaining -= 1;
            Tick::Counting(self.remaining)
        }
    }

    /// Snap to the server's view of the time left, e.g. after a refresh.
    pub fn resync(&mut self, seconds_remaining: i64, reset_to: u32) {
        self.reset_to = reset_to.max(1);
        self.remaining = u32::try_from(seconds_remaining).unwrap_or(0).clamp(1, self.reset_to);
    }
}
