//! Render surface seam: where trials mount and unmount.
//!
//! The kernel never renders anything itself. It hands the current trial
//! input and a progress indicator to a `TrialSurface` and asks for teardown
//! when the trial's output has been recorded. Mount and unmount are
//! synchronous from the kernel's point of view.

use crate::sequencer::Progress;

/// The host-owned mount point for trial UI.
pub trait TrialSurface<I> {
    /// Render the given trial input and update the phase progress indicator.
    fn mount(&mut self, input: &I, progress: Progress);

    /// Tear down the currently rendered trial.
    fn unmount(&mut self);
}

/// Surface that renders nothing. For headless runs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl<I> TrialSurface<I> for NullSurface {
    fn mount(&mut self, _input: &I, _progress: Progress) {}
    fn unmount(&mut self) {}
}

/// What a recording surface observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Mounted { index: usize, progress: Progress },
    Unmounted,
}

/// Surface that records mount/unmount calls for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub events: Vec<SurfaceEvent>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mounts(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SurfaceEvent::Mounted { .. }))
            .count()
    }

    pub fn unmounts(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SurfaceEvent::Unmounted))
            .count()
    }
}

impl<I> TrialSurface<I> for RecordingSurface {
    fn mount(&mut self, _input: &I, progress: Progress) {
        self.events.push(SurfaceEvent::Mounted {
            index: progress.completed,
            progress,
        });
    }

    fn unmount(&mut self) {
        self.events.push(SurfaceEvent::Unmounted);
    }
}
