//! Install progress accounting
//!
//! Essential assets fill the 0-50% band. The 50-100% ramp that follows is
//! synthetic: later assets are cached lazily on first request, so reaching
//! 100% says nothing about how complete the store is.

/// Upper bound of the band covered by essential assets
pub const ESSENTIAL_BAND: u8 = 50;

/// Monotonic progress within one install session
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamp `percent` to [last, 100] and record it
    pub fn advance(&mut self, percent: u8) -> u8 {
        self.last = percent.min(100).max(self.last);
        self.last
    }

    pub fn current(&self) -> u8 {
        self.last
    }
}

/// Percent reached after `done` of `total` essential assets
pub fn essential_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return ESSENTIAL_BAND;
    }
    let done = done.min(total);
    (done * usize::from(ESSENTIAL_BAND) / total) as u8
}

/// Synthetic steps from `from` (exclusive) up to and including 100
pub fn ramp_steps(from: u8, step: u8) -> Vec<u8> {
    let from = from.min(100);
    if step == 0 {
        return if from < 100 { vec![100] } else { vec![] };
    }

    let mut steps = vec![];
    let mut next = u16::from(from) + u16::from(step);
    while next < 100 {
        steps.push(next as u8);
        next += u16::from(step);
    }
    if from < 100 {
        steps.push(100);
    }
    steps
}
