//! `TerminalReporter` — Presentation-layer implementation of `ProgressReporter`.
//!
//! Each stage announcement replaces the previous stage's spinner with a
//! checkmarked line and starts a fresh spinner, so a saga reads as a list of
//! completed steps with the current one ticking at the bottom.

use std::cell::RefCell;

use indicatif::ProgressBar;
use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::progress;

/// Terminal progress reporter. With `quiet` set, nothing is printed.
pub struct TerminalReporter {
    quiet: bool,
    current: RefCell<Option<ProgressBar>>,
}

impl TerminalReporter {
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            current: RefCell::new(None),
        }
    }

    fn finish_current(&self) {
        if let Some(pb) = self.current.borrow_mut().take() {
            let msg = pb.message();
            progress::finish_ok(&pb, &msg);
        }
    }
}

impl ProgressReporter for TerminalReporter {
    fn announce_stage(&self, label: &str) {
        if self.quiet {
            return;
        }
        self.finish_current();
        *self.current.borrow_mut() = Some(progress::spinner(label));
    }

    fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.finish_current();
        println!("{} {message}", "✓".green());
    }

    fn warn(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.finish_current();
        println!("{} {message}", "!".yellow());
    }
}

impl Drop for TerminalReporter {
    fn drop(&mut self) {
        // A failed saga leaves its last spinner ticking; clear it.
        if let Some(pb) = self.current.borrow_mut().take() {
            pb.finish_and_clear();
        }
    }
}
