//! Rolling neighbor-count statistics used to scale visualization colors.
//!
//! Every frame produces the smallest and largest neighbor count seen across
//! the population. Coloring against the raw per-frame extremes flickers, so
//! the renderer is fed their average over the last `H` frames instead.
//! The average is maintained in O(1) per frame: a circular buffer keeps the
//! last `H` values and a running sum is corrected by the value that falls
//! out of the window.

/// Default history length in frames.
pub const HISTORY: usize = 100;

/// Rolling average of per-frame minima and maxima over `H` frames.
#[derive(Clone, Debug)]
pub struct RollingMinMax<const H: usize> {
    mins: [f32; H],
    maxs: [f32; H],
    sum_min: f64,
    sum_max: f64,
    index: usize,
    updates: u64,
    average_min: f32,
    average_max: f32,
}

/// Neighbor statistics with the default history length.
pub type NeighborStats = RollingMinMax<HISTORY>;

impl<const H: usize> RollingMinMax<H> {
    pub fn new() -> Self {
        assert!(H > 0, "history length must be non-zero");
        Self {
            mins: [0.0; H],
            maxs: [0.0; H],
            sum_min: 0.0,
            sum_max: 0.0,
            index: 0,
            updates: 0,
            average_min: 0.0,
            average_max: 0.0,
        }
    }

    /// Push one frame's extremes, evicting the value recorded `H` frames ago.
    ///
    /// The window is zero-filled at start, so during the first `H` frames
    /// the averages ramp up from zero rather than jumping.
    pub fn update(&mut self, min: f32, max: f32) {
        let old_min = self.mins[self.index];
        let old_max = self.maxs[self.index];
        self.mins[self.index] = min;
        self.maxs[self.index] = max;

        self.sum_min += f64::from(min) - f64::from(old_min);
        self.sum_max += f64::from(max) - f64::from(old_max);

        self.average_min = (self.sum_min / H as f64) as f32;
        self.average_max = (self.sum_max / H as f64) as f32;

        self.index = (self.index + 1) % H;
        self.updates += 1;
    }

    /// Average of the per-frame minima over the window.
    #[inline]
    pub fn average_min(&self) -> f32 {
        self.average_min
    }

    /// Average of the per-frame maxima over the window.
    #[inline]
    pub fn average_max(&self) -> f32 {
        self.average_max
    }

    /// Running `(min, max)` sums over the window.
    #[inline]
    pub fn running_sums(&self) -> (f64, f64) {
        (self.sum_min, self.sum_max)
    }

    /// Slot the next update will overwrite.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Total number of updates since construction.
    #[inline]
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Window length.
    #[inline]
    pub const fn history(&self) -> usize {
        H
    }

    /// Buffered `(mins, maxs)` in slot order.
    pub fn window(&self) -> (&[f32], &[f32]) {
        (&self.mins, &self.maxs)
    }
}

impl<const H: usize> Default for RollingMinMax<H> {
    fn default() -> Self {
        Self::new()
    }
}
