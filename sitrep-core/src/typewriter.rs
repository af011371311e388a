//! Character-by-character reveal of narrative text.

use crate::reveal::{RevealError, RevealSequencer};
use std::time::Duration;

/// Types a string out into a single mutable slot.
///
/// This is a [`RevealSequencer`] over `char`s whose sink accumulates into
/// one growing prefix instead of appending discrete items.
#[derive(Default)]
pub struct TypewriterAnimator {
    sequencer: RevealSequencer<char>,
}

impl TypewriterAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start typing `full_text`.
    ///
    /// `on_tick` receives the prefix shown so far after each character;
    /// `on_complete` fires once the full text has been shown. Starting again
    /// cancels the previous animation and restarts from an empty prefix.
    pub fn start<F, C>(
        &self,
        full_text: &str,
        interval: Duration,
        mut on_tick: F,
        on_complete: C,
    ) -> Result<u64, RevealError>
    where
        F: FnMut(&str) + 'static,
        C: FnOnce() + 'static,
    {
        let chars: Vec<char> = full_text.chars().collect();
        let mut prefix = String::with_capacity(full_text.len());

        self.sequencer.start(
            chars,
            interval,
            move |c| {
                prefix.push(c);
                on_tick(&prefix);
            },
            on_complete,
        )
    }

    /// Stop typing; whatever prefix was shown stays shown.
    pub fn cancel(&self) -> bool {
        self.sequencer.cancel()
    }

    pub fn is_active(&self) -> bool {
        self.sequencer.is_active()
    }

    /// Number of characters shown in the current (or last) animation.
    pub fn shown_chars(&self) -> usize {
        self.sequencer.cursor()
    }

    /// The text shown so far.
    pub fn shown(&self) -> String {
        self.sequencer.revealed().into_iter().collect()
    }
}
