//! The trial sequencer: run a list of inputs, collect one output per input,
//! advance when the live trial's output arrives.
//!
//! A sequencer is a single-threaded, participant-paced state machine. At
//! most one trial is live at a time; completion of trial *i* is a strict
//! prerequisite for starting trial *i+1*.

use tracing::debug;

use crate::surface::TrialSurface;

/// Phase progress: how many trials have a recorded output out of the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// Text for the progress indicator, e.g. `Completed: 2/4`.
    pub fn label(&self) -> String {
        format!("Completed: {}/{}", self.completed, self.total)
    }

    /// Fill percentage for a progress bar, rounded to whole percent.
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            100
        } else {
            (100.0 * self.completed as f64 / self.total as f64).round() as u32
        }
    }
}

/// Outcome of an advance step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// A trial is live at the given input index (newly mounted, or already
    /// live if advance was called redundantly).
    Mounted(usize),
    /// Every input has a recorded output; the phase is finished.
    Complete,
}

/// Ordered trial inputs and the outputs collected for them so far.
///
/// Invariants: outputs are appended in strict input order,
/// `outputs.len() <= inputs.len()` always, and the phase is done iff the
/// two lengths are equal.
#[derive(Debug, Clone)]
pub struct Sequencer<I, O> {
    inputs: Vec<I>,
    outputs: Vec<O>,
    live: Option<usize>,
}

impl<I, O> Sequencer<I, O> {
    pub fn new(inputs: Vec<I>) -> Self {
        Self {
            inputs,
            outputs: Vec::new(),
            live: None,
        }
    }

    /// Begin the phase: advance with an empty output list.
    pub fn start(&mut self, surface: &mut dyn TrialSurface<I>) -> Advance {
        self.advance(surface)
    }

    /// Mount the next trial, or report completion once every output is in.
    ///
    /// Redundant calls while a trial is live re-report `Mounted` without
    /// remounting; calls after completion are no-ops.
    pub fn advance(&mut self, surface: &mut dyn TrialSurface<I>) -> Advance {
        if self.outputs.len() == self.inputs.len() {
            self.live = None;
            return Advance::Complete;
        }
        if let Some(index) = self.live {
            debug!(index, "advance with live trial; not remounting");
            return Advance::Mounted(index);
        }
        let index = self.outputs.len();
        surface.mount(&self.inputs[index], self.progress());
        self.live = Some(index);
        Advance::Mounted(index)
    }

    /// Record the live trial's output, tear down its UI, then advance.
    ///
    /// An output arriving with no live trial is dropped (duplicate-advance
    /// guard); the sequencer then advances according to its own state.
    pub fn record_and_advance(
        &mut self,
        output: O,
        surface: &mut dyn TrialSurface<I>,
    ) -> Advance {
        match self.live.take() {
            Some(index) => {
                debug_assert_eq!(index, self.outputs.len());
                self.outputs.push(output);
                surface.unmount();
                self.advance(surface)
            }
            None => {
                debug!("output with no live trial dropped");
                self.advance(surface)
            }
        }
    }

    pub fn inputs(&self) -> &[I] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[O] {
        &self.outputs
    }

    /// Index of the live trial, if one is mounted.
    pub fn live(&self) -> Option<usize> {
        self.live
    }

    /// Input of the live trial, if one is mounted.
    pub fn current_input(&self) -> Option<&I> {
        self.live.map(|i| &self.inputs[i])
    }

    pub fn is_done(&self) -> bool {
        self.outputs.len() == self.inputs.len()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.outputs.len(),
            total: self.inputs.len(),
        }
    }
}
