//! Reveal timers feeding shared stores, observed the way a renderer would.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use sitrep_core::{RevealSequencer, SharedStore, StoreLog, TypewriterAnimator};
use tokio::task::LocalSet;
use tokio::time::sleep;

const STEP: Duration = Duration::from_millis(100);

#[tokio::test(start_paused = true)]
async fn test_store_grows_by_one_per_tick() {
    LocalSet::new()
        .run_until(async {
            let store = SharedStore::new();
            let log = StoreLog::attach(&store);
            let seq = RevealSequencer::new();
            let done = Rc::new(Cell::new(false));
            let flag = Rc::clone(&done);

            seq.start(
                (1..=6).collect(),
                STEP,
                store.appender(),
                move || flag.set(true),
            )
            .unwrap();

            sleep(Duration::from_millis(750)).await;

            assert_eq!(log.lengths(), vec![1, 2, 3, 4, 5, 6]);
            for pair in log.frames().windows(2) {
                assert!(pair[1].starts_with(&pair[0]));
            }
            assert!(done.get());
            assert_eq!(store.current(), vec![1, 2, 3, 4, 5, 6]);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_leaves_store_alone() {
    LocalSet::new()
        .run_until(async {
            let store = SharedStore::new();
            let seq = RevealSequencer::new();
            let done = Rc::new(Cell::new(false));
            let flag = Rc::clone(&done);

            seq.start(
                vec!['x', 'y', 'z'],
                STEP,
                store.appender(),
                move || flag.set(true),
            )
            .unwrap();

            sleep(Duration::from_millis(150)).await;
            seq.cancel();
            let log = StoreLog::attach(&store);

            sleep(Duration::from_secs(5)).await;
            assert_eq!(log.count(), 0);
            assert_eq!(store.current(), vec!['x']);
            assert!(!done.get());
            assert!(seq.cursor() < seq.source_len());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_typewriter_restarted_from_its_own_completion() {
    LocalSet::new()
        .run_until(async {
            let typer = Rc::new(TypewriterAnimator::new());
            let slot = SharedStore::new();
            let log = StoreLog::attach(&slot);
            let finished = Rc::new(RefCell::new(Vec::new()));

            let second_slot = slot.clone();
            let second_done = Rc::clone(&finished);
            let restart = Rc::clone(&typer);
            let first_slot = slot.clone();
            let first_done = Rc::clone(&finished);
            typer
                .start(
                    "ab",
                    STEP,
                    move |prefix| first_slot.set_last(prefix.to_string()),
                    move || {
                        first_done.borrow_mut().push("first");
                        restart
                            .start(
                                "cd",
                                STEP,
                                move |prefix| second_slot.set_last(prefix.to_string()),
                                move || second_done.borrow_mut().push("second"),
                            )
                            .unwrap();
                    },
                )
                .unwrap();

            sleep(Duration::from_secs(1)).await;

            let shown: Vec<String> = log
                .frames()
                .into_iter()
                .filter_map(|frame| frame.last().cloned())
                .collect();
            assert_eq!(shown, vec!["a", "ab", "c", "cd"]);
            assert_eq!(*finished.borrow(), vec!["first", "second"]);
            assert!(!typer.is_active());
        })
        .await;
}
