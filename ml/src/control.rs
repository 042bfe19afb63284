use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Lifecycle of a [`TrainingLoop`](crate::training::TrainingLoop).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Cloneable stop handle, checked by the training loop before every step.
#[derive(Clone, Debug, Default)]
pub struct Interrupter {
    state: Arc<AtomicBool>,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the loop to stop before its next step.
    pub fn stop(&self) {
        self.state.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.state.store(false, Ordering::Relaxed);
    }

    /// True if `stop()` has been called.
    pub fn should_stop(&self) -> bool {
        self.state.load(Ordering::Relaxed)
    }
}

/// Scheduling point the loop hands control to after each completed step.
///
/// Implementations may pause by blocking here.
pub trait YieldPoint {
    fn yield_step(&mut self, step: usize);
}

/// Gives other threads a chance to run between steps.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadYield;

impl YieldPoint for ThreadYield {
    fn yield_step(&mut self, _step: usize) {
        std::thread::yield_now();
    }
}

/// Never yields.
#[derive(Clone, Copy, Debug, Default)]
pub struct Headless;

impl YieldPoint for Headless {
    fn yield_step(&mut self, _step: usize) {}
}
