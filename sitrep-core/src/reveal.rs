//! Timer-driven, one-item-at-a-time reveal of an ordered sequence.
//!
//! A [`RevealSequencer`] owns a [`RevealState`] and at most one timer task.
//! Every run is stamped with a generation; the timer task captures the
//! generation it was started with and stops as soon as the live state has
//! moved on, so a cancelled or superseded run can never write into a sink
//! again.
//!
//! Timer tasks are spawned with [`tokio::task::spawn_local`], so `start`
//! must be called from inside a [`tokio::task::LocalSet`].

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Errors from starting a reveal run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RevealError {
    #[error("Invalid configuration: reveal interval must be positive, got {0:?}")]
    InvalidConfiguration(Duration),
}

/// Progress of the current (or most recent) reveal run.
///
/// `revealed()` is always a prefix of `source()` and its length equals the
/// cursor. The cursor only moves forward within a run and goes back to zero
/// when a new run begins.
#[derive(Debug)]
pub struct RevealState<T> {
    source: Vec<T>,
    cursor: usize,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Outcome of a single timer tick.
#[derive(Debug, PartialEq)]
enum Tick<T> {
    Reveal(T),
    Finished,
    Stale,
}

impl<T> Default for RevealState<T> {
    fn default() -> Self {
        Self {
            source: Vec::new(),
            cursor: 0,
            generation: 0,
            timer: None,
        }
    }
}

impl<T: Clone> RevealState<T> {
    pub fn source(&self) -> &[T] {
        &self.source
    }

    pub fn revealed(&self) -> &[T] {
        &self.source[..self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.timer.is_some()
    }

    /// Stop the timer and invalidate the running generation.
    fn halt(&mut self) -> bool {
        self.generation += 1;
        match self.timer.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Supersede whatever was running and reset for `items`.
    fn begin(&mut self, items: Vec<T>) -> u64 {
        self.halt();
        self.source = items;
        self.cursor = 0;
        self.generation
    }

    fn advance(&mut self, generation: u64) -> Tick<T> {
        if generation != self.generation {
            return Tick::Stale;
        }
        match self.source.get(self.cursor) {
            Some(item) => {
                let item = item.clone();
                self.cursor += 1;
                Tick::Reveal(item)
            }
            None => {
                // Detach rather than abort: this runs inside the timer task.
                self.timer = None;
                Tick::Finished
            }
        }
    }
}

/// Reveals items into a sink one per interval.
///
/// At most one run is active at a time; starting a new run cancels the
/// previous one first. An N-item run reveals on ticks 1..=N and completes on
/// tick N+1, so an empty run completes one interval after `start`, never
/// synchronously.
pub struct RevealSequencer<T> {
    state: Rc<RefCell<RevealState<T>>>,
}

impl<T: Clone + 'static> Default for RevealSequencer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> RevealSequencer<T> {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(RevealState::default())),
        }
    }

    /// Begin revealing `items` into `sink`.
    ///
    /// `on_complete` fires exactly once if the run reaches its end and never
    /// if it is cancelled or superseded. Returns the run's generation.
    pub fn start<S, C>(
        &self,
        items: Vec<T>,
        interval: Duration,
        mut sink: S,
        on_complete: C,
    ) -> Result<u64, RevealError>
    where
        S: FnMut(T) + 'static,
        C: FnOnce() + 'static,
    {
        if interval.is_zero() {
            return Err(RevealError::InvalidConfiguration(interval));
        }

        let len = items.len();
        let generation = self.state.borrow_mut().begin(items);
        tracing::debug!(generation, len, ?interval, "reveal run started");

        let state = Rc::clone(&self.state);
        let handle = tokio::task::spawn_local(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut on_complete = Some(on_complete);

            loop {
                ticker.tick().await;
                // Release the borrow before calling out.
                let tick = state.borrow_mut().advance(generation);
                match tick {
                    Tick::Reveal(item) => sink(item),
                    Tick::Finished => {
                        tracing::debug!(generation, "reveal run complete");
                        if let Some(done) = on_complete.take() {
                            done();
                        }
                        break;
                    }
                    Tick::Stale => break,
                }
            }
        });

        self.state.borrow_mut().timer = Some(handle);
        Ok(generation)
    }

    /// Stop the active run, if any. Already revealed items stay in the sink.
    ///
    /// Returns whether a run was actually stopped; calling it again is a
    /// no-op.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if !state.is_active() {
            return false;
        }
        let cursor = state.cursor;
        let total = state.source.len();
        state.halt();
        tracing::debug!(cursor, total, "reveal run cancelled");
        true
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().is_active()
    }

    pub fn cursor(&self) -> usize {
        self.state.borrow().cursor()
    }

    pub fn generation(&self) -> u64 {
        self.state.borrow().generation()
    }

    /// Items revealed so far in the current (or last) run.
    pub fn revealed(&self) -> Vec<T> {
        self.state.borrow().revealed().to_vec()
    }

    pub fn source_len(&self) -> usize {
        self.state.borrow().source().len()
    }
}

impl<T> Drop for RevealSequencer<T> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.generation += 1;
            if let Some(handle) = state.timer.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::task::LocalSet;
    use tokio::time::sleep;

    const STEP: Duration = Duration::from_millis(100);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_state_advance_and_stale() {
        let mut state = RevealState::default();
        let generation = state.begin(vec!['a', 'b']);

        assert_eq!(state.advance(generation), Tick::Reveal('a'));
        assert_eq!(state.revealed(), &['a']);
        assert_eq!(state.advance(generation + 1), Tick::Stale);
        assert_eq!(state.advance(generation), Tick::Reveal('b'));
        assert_eq!(state.advance(generation), Tick::Finished);
        assert_eq!(state.cursor(), 2);
    }

    #[test]
    fn test_begin_resets_cursor_and_bumps_generation() {
        let mut state = RevealState::default();
        let first = state.begin(vec![1, 2, 3]);
        state.advance(first);
        let second = state.begin(vec![9]);

        assert!(second > first);
        assert_eq!(state.cursor(), 0);
        assert_eq!(state.source(), &[9]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_rejected() {
        LocalSet::new()
            .run_until(async {
                let seq = RevealSequencer::new();
                let err = seq
                    .start(vec![1], Duration::ZERO, |_: i32| {}, || {})
                    .unwrap_err();
                assert_eq!(err, RevealError::InvalidConfiguration(Duration::ZERO));
                assert!(!seq.is_active());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveals_one_per_tick_then_completes() {
        LocalSet::new()
            .run_until(async {
                let seq = RevealSequencer::new();
                let out = Rc::new(RefCell::new(Vec::new()));
                let done = Rc::new(Cell::new(0));

                let sink = Rc::clone(&out);
                let flag = Rc::clone(&done);
                seq.start(
                    vec!["a", "b", "c"],
                    STEP,
                    move |item| sink.borrow_mut().push(item),
                    move || flag.set(flag.get() + 1),
                )
                .unwrap();

                sleep(ms(50)).await;
                assert!(out.borrow().is_empty());

                sleep(ms(100)).await; // t = 150
                assert_eq!(*out.borrow(), vec!["a"]);

                sleep(ms(100)).await; // t = 250
                assert_eq!(*out.borrow(), vec!["a", "b"]);

                sleep(ms(100)).await; // t = 350
                assert_eq!(*out.borrow(), vec!["a", "b", "c"]);
                assert_eq!(done.get(), 0);

                sleep(ms(100)).await; // t = 450
                assert_eq!(done.get(), 1);
                assert!(!seq.is_active());

                sleep(ms(1000)).await;
                assert_eq!(done.get(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_run_completes_on_next_tick() {
        LocalSet::new()
            .run_until(async {
                let seq: RevealSequencer<u8> = RevealSequencer::new();
                let done = Rc::new(Cell::new(false));
                let flag = Rc::clone(&done);

                seq.start(Vec::new(), STEP, |_| {}, move || flag.set(true))
                    .unwrap();
                assert!(!done.get());

                sleep(ms(150)).await;
                assert!(done.get());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent_and_suppresses_completion() {
        LocalSet::new()
            .run_until(async {
                let seq = RevealSequencer::new();
                let out = Rc::new(RefCell::new(Vec::new()));
                let done = Rc::new(Cell::new(false));

                let sink = Rc::clone(&out);
                let flag = Rc::clone(&done);
                seq.start(
                    vec![1, 2, 3, 4],
                    STEP,
                    move |item| sink.borrow_mut().push(item),
                    move || flag.set(true),
                )
                .unwrap();

                sleep(ms(250)).await;
                assert!(seq.cancel());
                assert!(!seq.cancel());

                sleep(ms(1000)).await;
                assert_eq!(*out.borrow(), vec![1, 2]);
                assert_eq!(seq.revealed(), vec![1, 2]);
                assert!(!done.get());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_supersedes_previous_run() {
        LocalSet::new()
            .run_until(async {
                let seq = RevealSequencer::new();
                let out = Rc::new(RefCell::new(Vec::new()));
                let first_done = Rc::new(Cell::new(false));

                let sink = Rc::clone(&out);
                let flag = Rc::clone(&first_done);
                seq.start(
                    vec![1, 2, 3],
                    STEP,
                    move |item| sink.borrow_mut().push(item),
                    move || flag.set(true),
                )
                .unwrap();

                sleep(ms(150)).await;

                let sink = Rc::clone(&out);
                seq.start(vec![10, 20], STEP, move |item| sink.borrow_mut().push(item), || {})
                    .unwrap();

                sleep(ms(1000)).await;
                assert_eq!(*out.borrow(), vec![1, 10, 20]);
                assert!(!first_done.get());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_from_completion_callback() {
        LocalSet::new()
            .run_until(async {
                let seq = Rc::new(RevealSequencer::new());
                let out = Rc::new(RefCell::new(Vec::new()));

                let again = Rc::clone(&seq);
                let sink = Rc::clone(&out);
                let sink2 = Rc::clone(&out);
                seq.start(
                    vec!['x'],
                    STEP,
                    move |c| sink.borrow_mut().push(c),
                    move || {
                        again
                            .start(vec!['y'], STEP, move |c| sink2.borrow_mut().push(c), || {})
                            .unwrap();
                    },
                )
                .unwrap();

                sleep(ms(1000)).await;
                assert_eq!(*out.borrow(), vec!['x', 'y']);
            })
            .await;
    }
}
