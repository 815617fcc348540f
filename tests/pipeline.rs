mod util;

use linkcore::action::{Action, ActionProcessor, OwnActionPtr, Pipeline, StageFactory, StageHandle, Status, Stoppable, UpdateStatus};
use linkcore::time::Instant;
use std::cell::RefCell;
use std::rc::Rc;

/// Resolves `Result` on its first `update`, recording how many times it ran.
struct ImmediateResult {
    ran: Rc<RefCell<u32>>,
}

impl Action for ImmediateResult {
    fn update(&mut self, _now: Instant) -> UpdateStatus {
        *self.ran.borrow_mut() += 1;
        UpdateStatus::Result
    }
}

impl Stoppable for ImmediateResult {
    fn stop(&mut self) {}
}

struct ImmediateStop;

impl Action for ImmediateStop {
    fn update(&mut self, _now: Instant) -> UpdateStatus {
        UpdateStatus::Stop
    }
}

impl Stoppable for ImmediateStop {
    fn stop(&mut self) {}
}

fn result_stage(ran: Rc<RefCell<u32>>) -> StageFactory {
    Box::new(move |proc: &ActionProcessor| {
        let ptr = proc.spawn(ImmediateResult { ran: ran.clone() });
        Some(StageHandle::new_stoppable(ptr))
    })
}

fn stop_stage() -> StageFactory {
    Box::new(|proc: &ActionProcessor| {
        let ptr = proc.spawn(ImmediateStop);
        Some(StageHandle::new_stoppable(ptr))
    })
}

/// S1: every stage resolving `Result` in turn carries the pipeline to
/// `Result`, running each stage exactly once.
#[test]
fn pipeline_runs_every_stage_to_completion() {
    util::init();
    let processor = ActionProcessor::new();

    let counters: Vec<_> = (0..3).map(|_| Rc::new(RefCell::new(0u32))).collect();
    let stages: Vec<StageFactory> = counters.iter().cloned().map(result_stage).collect();

    let pipeline = processor.spawn(Pipeline::new(processor.clone(), stages));

    util::run_until(&processor, 20, || pipeline.is_finished());

    for counter in &counters {
        assert_eq!(*counter.borrow(), 1);
    }

    let saw_result = Rc::new(RefCell::new(false));
    let saw_result2 = saw_result.clone();
    let _sub = pipeline.on_status(move |s| {
        if matches!(s, Status::Result) {
            *saw_result2.borrow_mut() = true;
        }
    });
    // The pipeline already finished above, so a late subscriber never
    // observes the original emission — confirms the no-replay contract.
    assert!(!*saw_result.borrow());
}

/// S2: a stage resolving `Stop` short-circuits the pipeline; later stages
/// never run.
#[test]
fn pipeline_stop_short_circuits_remaining_stages() {
    util::init();
    let processor = ActionProcessor::new();

    let ran_after = Rc::new(RefCell::new(0u32));
    let stages: Vec<StageFactory> = vec![stop_stage(), result_stage(ran_after.clone())];

    let pipeline = processor.spawn(Pipeline::new(processor.clone(), stages));

    util::run_until(&processor, 20, || pipeline.is_finished());

    assert_eq!(*ran_after.borrow(), 0);
    assert!(pipeline.is_finished());
}

/// Universal invariant: a finished action's terminal status fires exactly
/// once even if the scheduler keeps ticking it.
#[test]
fn terminal_status_fires_once() {
    let processor = ActionProcessor::new();
    let count = Rc::new(RefCell::new(0u32));
    let action = processor.spawn(ImmediateResult { ran: Rc::new(RefCell::new(0)) });

    let count2 = count.clone();
    action.on_result(move || *count2.borrow_mut() += 1);

    let mut now = Instant::now();
    for _ in 0..5 {
        processor.tick(now);
        now = now + std::time::Duration::from_millis(1);
    }

    assert_eq!(*count.borrow(), 1);
}

/// Never resolves on its own; only terminates once `stop` is called,
/// returning `Stop` on the tick after.
struct LongRunner {
    stopped: Rc<RefCell<bool>>,
    stop_calls: Rc<RefCell<u32>>,
}

impl Action for LongRunner {
    fn update(&mut self, _now: Instant) -> UpdateStatus {
        if *self.stopped.borrow() {
            UpdateStatus::Stop
        } else {
            UpdateStatus::Nothing
        }
    }
}

impl Stoppable for LongRunner {
    fn stop(&mut self) {
        *self.stop_calls.borrow_mut() += 1;
        *self.stopped.borrow_mut() = true;
    }
}

fn long_running_stage(stopped: Rc<RefCell<bool>>, stop_calls: Rc<RefCell<u32>>) -> StageFactory {
    Box::new(move |proc: &ActionProcessor| {
        let ptr = proc.spawn(LongRunner {
            stopped: stopped.clone(),
            stop_calls: stop_calls.clone(),
        });
        Some(StageHandle::new_stoppable(ptr))
    })
}

/// S2: an external `Pipeline::stop()` call made while a stage is actively
/// running (as opposed to a stage resolving `Stop` on its own, covered by
/// `pipeline_stop_short_circuits_remaining_stages`) propagates into the
/// currently running stage and short-circuits the remaining ones.
#[test]
fn external_stop_propagates_to_the_running_stage() {
    util::init();
    let processor = ActionProcessor::new();

    let stopped = Rc::new(RefCell::new(false));
    let stop_calls = Rc::new(RefCell::new(0u32));
    let ran_after = Rc::new(RefCell::new(0u32));
    let stages: Vec<StageFactory> = vec![
        long_running_stage(stopped.clone(), stop_calls.clone()),
        result_stage(ran_after.clone()),
    ];

    let pipeline = processor.spawn(Pipeline::new(processor.clone(), stages));

    // One tick to start stage 0; the long runner never resolves on its own.
    processor.tick(Instant::now());
    assert_eq!(pipeline.index(), 0);
    assert!(!pipeline.is_finished());
    assert_eq!(*stop_calls.borrow(), 0);

    // External stop, unrelated to anything the running stage itself did.
    pipeline.borrow_mut().stop();
    assert_eq!(*stop_calls.borrow(), 1, "stop() must reach the running stage synchronously");

    util::run_until(&processor, 20, || pipeline.is_finished());

    assert_eq!(*ran_after.borrow(), 0, "a later stage must never start once an earlier one is stopped externally");
}

/// `OwnActionPtr`'s `Drop` is the crate's only automatic cancellation path:
/// dropping it while the wrapped action hasn't reached a terminal state
/// calls `Stoppable::stop` on it.
#[test]
fn own_action_ptr_drop_stops_the_unfinished_action() {
    util::init();
    let processor = ActionProcessor::new();

    let stopped = Rc::new(RefCell::new(false));
    let stop_calls = Rc::new(RefCell::new(0u32));
    let ptr = processor.spawn(LongRunner {
        stopped: stopped.clone(),
        stop_calls: stop_calls.clone(),
    });

    {
        let owned = OwnActionPtr::new(ptr.clone());
        processor.tick(Instant::now());
        assert!(!owned.is_finished());
        assert_eq!(*stop_calls.borrow(), 0);
        // owned drops here while the action is still unfinished.
    }

    assert_eq!(*stop_calls.borrow(), 1, "drop must call stop() exactly once on an unfinished action");

    let saw_stop = Rc::new(RefCell::new(false));
    let saw_stop2 = saw_stop.clone();
    let _sub = ptr.on_stop(move || *saw_stop2.borrow_mut() = true);

    util::run_until(&processor, 20, || ptr.is_finished());
    assert!(*saw_stop.borrow(), "the action must actually terminate with Stop after being cancelled");
}

/// Universal invariant: an action spawned during a tick is not part of that
/// tick's snapshot; it first runs on the following tick.
#[test]
fn spawned_action_waits_for_the_next_tick() {
    let processor = ActionProcessor::new();
    let ran = Rc::new(RefCell::new(0u32));

    struct Spawner {
        ran: Rc<RefCell<u32>>,
        processor: ActionProcessor,
        spawned: bool,
    }

    impl Action for Spawner {
        fn update(&mut self, _now: Instant) -> UpdateStatus {
            if !self.spawned {
                self.spawned = true;
                self.processor.spawn(ImmediateResult { ran: self.ran.clone() });
            }
            UpdateStatus::Nothing
        }
    }

    processor.spawn(Spawner {
        ran: ran.clone(),
        processor: processor.clone(),
        spawned: false,
    });

    let now = Instant::now();
    processor.tick(now);
    assert_eq!(*ran.borrow(), 0, "spawned action must not run on the tick that spawned it");

    processor.tick(now);
    assert_eq!(*ran.borrow(), 1);
}
