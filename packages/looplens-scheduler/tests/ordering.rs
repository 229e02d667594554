//! Property tests for scheduling order over generated scripts.
//!
//! Scripts are flat sequences of prints, timers, deferred callbacks and
//! `.then` continuations, each callback printing a unique label. Some
//! deferred callbacks queue one more deferred callback while they run.

use looplens_core::SchedulerPhase;
use looplens_scheduler::generate;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Print,
    Timer(u64),
    Deferred,
    NestedDeferred,
    Then,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Print),
        (0u64..4).prop_map(Op::Timer),
        Just(Op::Deferred),
        Just(Op::NestedDeferred),
        Just(Op::Then),
    ]
}

/// Renders the script and the output a correct scheduler must produce.
fn build(ops: &[Op]) -> (String, Vec<String>) {
    let mut source = String::new();
    let mut sync = Vec::new();
    let mut deferred = Vec::new();
    let mut queued_while_draining = Vec::new();
    let mut timers = Vec::new();

    for (index, op) in ops.iter().enumerate() {
        let label = format!("op{index}");
        match op {
            Op::Print => {
                source.push_str(&format!("console.log('{label}');\n"));
                sync.push(label);
            }
            Op::Timer(delay) => {
                source.push_str(&format!("setTimeout(() => console.log('{label}'), {delay});\n"));
                timers.push((*delay, label));
            }
            Op::Deferred => {
                source.push_str(&format!("queueMicrotask(() => console.log('{label}'));\n"));
                deferred.push(label);
            }
            Op::NestedDeferred => {
                source.push_str(&format!(
                    "queueMicrotask(() => {{ console.log('{label}'); \
                     queueMicrotask(() => console.log('{label}-nested')); }});\n"
                ));
                deferred.push(label.clone());
                queued_while_draining.push(format!("{label}-nested"));
            }
            Op::Then => {
                source.push_str(&format!("Promise.resolve().then(() => console.log('{label}'));\n"));
                deferred.push(label);
            }
        }
    }

    // Stable sort keeps registration order among equal delays.
    timers.sort_by_key(|(delay, _)| *delay);

    let mut expected = sync;
    expected.extend(deferred);
    expected.extend(queued_while_draining);
    expected.extend(timers.into_iter().map(|(_, label)| label));
    (source, expected)
}

proptest! {
    #[test]
    fn output_follows_deferred_then_delay_order(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let (source, expected) = build(&ops);
        let timeline = generate(&source);
        prop_assert_eq!(timeline.final_output(), expected.as_slice());
    }

    #[test]
    fn snapshot_ids_are_dense_and_increasing(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let (source, _) = build(&ops);
        let timeline = generate(&source);
        for (index, snapshot) in timeline.iter().enumerate() {
            prop_assert_eq!(snapshot.id, index);
        }
    }

    #[test]
    fn timers_never_run_while_deferred_work_waits(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let (source, _) = build(&ops);
        let timeline = generate(&source);
        for snapshot in &timeline {
            if snapshot.phase == SchedulerPhase::PromotingReady {
                prop_assert!(snapshot.deferred_queue.is_empty());
            }
        }
    }

    #[test]
    fn output_only_grows(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let (source, _) = build(&ops);
        let timeline = generate(&source);
        for pair in timeline.into_snapshots().windows(2) {
            prop_assert!(pair[1].output.starts_with(&pair[0].output));
        }
    }
}
