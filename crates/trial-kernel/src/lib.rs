//! Trial Kernel: participant-paced sequencing for browser-style experiments.
//!
//! The kernel is domain-agnostic: it runs an ordered list of trial inputs,
//! collects exactly one output per input, and advances only when the live
//! trial reports completion. All domain-specific logic lives in the trial
//! state machines and the render surface supplied by the host.

pub mod sequencer;
pub mod surface;

pub use sequencer::{Advance, Progress, Sequencer};
pub use surface::{NullSurface, RecordingSurface, SurfaceEvent, TrialSurface};
