/// Receives fractional progress in `[0, 1]` during long pool operations
pub trait ProgressReporter {
    fn set_progress(&self, fraction: f32);
}

impl<F: Fn(f32)> ProgressReporter for F {
    fn set_progress(&self, fraction: f32) {
        self(fraction)
    }
}
