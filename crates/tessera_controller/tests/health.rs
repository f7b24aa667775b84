//! Health aggregation across parts.


use indexmap::IndexMap;
use proptest::prelude::*;
use serde_json::{Value, json};
use tessera_controller::prelude::*;
use tessera_model::{Alarm, AlarmSeverity, AlarmStatus, Path, Response};
use test_utils::{TestPart, process, subscribe};

fn health(controller: &Controller) -> (Value, Value) {
    (
        controller.get(&Path::from(["health", "value"])).unwrap(),
        controller
            .get(&Path::from(["health", "alarm", "severity"]))
            .unwrap(),
    )
}

fn three_parts(process: &Process) -> Controller {
    Controller::builder("DEV")
        .part(TestPart::new("a"))
        .part(TestPart::new("b"))
        .part(TestPart::new("c"))
        .build(process)
        .unwrap()
}

#[tokio::test]
async fn worst_fault_wins_and_clearing_restores_ok() {
    let process = process();
    let controller = three_parts(&process);
    assert_eq!(health(&controller), (json!("OK"), json!(0)));

    controller.set_health("a", Some(Alarm::minor("a drifting")));
    controller.set_health("b", Some(Alarm::major("b jammed")));
    controller.set_health("c", Some(Alarm::minor("c warm")));
    assert_eq!(health(&controller), (json!("b jammed"), json!(2)));

    controller.set_health("b", None);
    assert_eq!(health(&controller), (json!("c warm"), json!(1)));

    controller.set_health("a", None);
    controller.set_health("c", None);
    assert_eq!(health(&controller), (json!("OK"), json!(0)));
}

#[tokio::test]
async fn parts_report_through_their_core() {
    let process = process();
    let part = std::sync::Arc::new(TestPart::new("motor"));
    let controller = Controller::builder("DEV")
        .shared_part(part.clone())
        .build(&process)
        .unwrap();

    part.core().set_health(Some(Alarm::invalid("encoder lost")));
    assert_eq!(health(&controller), (json!("encoder lost"), json!(3)));
}

#[tokio::test]
async fn health_update_is_one_batch() {
    let process = process();
    let controller = three_parts(&process);
    let mut stream = subscribe(&process, &["DEV", "health"], true).await;

    controller.set_health("a", Some(Alarm::major("a jammed")));

    let Some(Response::Delta { changes, .. }) = stream.recv().await else {
        panic!("expected one delta batch");
    };
    let paths: Vec<String> = changes.iter().map(|delta| delta.path.to_string()).collect();
    assert_eq!(paths, ["value", "timeStamp", "alarm"]);
    assert!(stream.try_recv().is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Properties
// ─────────────────────────────────────────────────────────────────────────────

const PARTS: [&str; 3] = ["a", "b", "c"];

fn severity() -> impl Strategy<Value = AlarmSeverity> {
    prop_oneof![
        Just(AlarmSeverity::MinorAlarm),
        Just(AlarmSeverity::MajorAlarm),
        Just(AlarmSeverity::InvalidAlarm),
    ]
}

proptest! {
    #[test]
    fn health_shows_most_severe_then_most_recent(
        ops in prop::collection::vec((0..PARTS.len(), prop::option::of(severity())), 1..24)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let process = Process::with_runtime("prop", runtime.handle().clone());
        let controller = three_parts(&process);

        let mut faults: IndexMap<&str, Alarm> = IndexMap::new();
        for (step, (part, severity)) in ops.into_iter().enumerate() {
            let part = PARTS[part];
            let alarm = severity.map(|severity| {
                Alarm::new(severity, AlarmStatus::NoStatus, format!("{part} #{step}"))
            });
            controller.set_health(part, alarm.clone());

            faults.shift_remove(part);
            if let Some(alarm) = alarm {
                faults.insert(part, alarm);
            }
        }

        let max = faults.values().map(|alarm| alarm.severity).max();
        let expected = faults
            .values()
            .rev()
            .find(|alarm| Some(alarm.severity) == max)
            .map_or((json!("OK"), json!(0)), |alarm| {
                (json!(alarm.message), json!(alarm.severity as u8))
            });
        prop_assert_eq!(health(&controller), expected);
    }
}
