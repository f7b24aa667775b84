//! Hook runs across several parts: results, parameters, failure and abort.


use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{Map, Value, json};
use tessera_controller::prelude::*;
use tessera_model::{MapMeta, NumberMeta, NumberType, StringMeta};
use test_utils::{TestPart, echo_args, echo_part, fail, nap, process};
use tokio::sync::mpsc;

fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_owned(), value.clone()))
        .collect()
}

async fn boom(_ctx: HookContext, _args: Vec<Value>) -> Result<Value, HookError> {
    panic!("wires crossed");
}

async fn linger(ctx: HookContext, _args: Vec<Value>) -> Result<Value, HookError> {
    ctx.sleep(Duration::from_secs(30)).await?;
    Ok(Value::Null)
}

// ─────────────────────────────────────────────────────────────────────────────
// Construction
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn hook_map_is_injective() {
    let process = process();

    let err = Controller::builder("A")
        .hook::<hook::Reset>()
        .hook_named::<hook::Reset>("again")
        .build(&process)
        .unwrap_err();
    assert!(matches!(err, ConstructionError::DuplicateHook { .. }));

    let err = Controller::builder("B")
        .hook_named::<hook::Reset>("go")
        .hook_named::<hook::Run>("go")
        .build(&process)
        .unwrap_err();
    assert_eq!(err, ConstructionError::DuplicateHookName("go".into()));

    assert!(process.mris().is_empty());
}

#[tokio::test]
async fn binding_to_undeclared_hook_fails_build() {
    let process = process();
    let err = Controller::builder("DEV")
        .hook::<hook::Reset>()
        .part(TestPart::bound::<hook::Run, _, _>("a", nap))
        .build(&process)
        .unwrap_err();
    assert!(matches!(err, ConstructionError::UnknownHook { ref part, .. } if part == "a"));
}

#[tokio::test]
async fn duplicate_part_name_fails_build() {
    let process = process();
    let err = Controller::builder("DEV")
        .part(TestPart::new("a"))
        .part(TestPart::new("a"))
        .build(&process)
        .unwrap_err();
    assert_eq!(err, ConstructionError::DuplicatePart("a".into()));
}

// ─────────────────────────────────────────────────────────────────────────────
// Results and parameters
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn run_collects_one_result_per_bound_part() {
    let process = process();
    let controller = Controller::builder("DEV")
        .hook::<hook::Reset>()
        .part(TestPart::bound::<hook::Reset, _, _>("a", echo_part))
        .part(TestPart::new("idle"))
        .part(TestPart::bound::<hook::Reset, _, _>("b", nap))
        .build(&process)
        .unwrap();

    let contexts = controller.create_part_contexts();
    assert_eq!(contexts.len(), 3);
    let results = controller
        .run_hook(HookId::of::<hook::Reset>(), &contexts, &[], &Map::new())
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results["a"], json!("a"));
    assert_eq!(results["b"], json!("b"));
    assert!(!results.contains_key("idle"));
}

#[tokio::test(flavor = "multi_thread")]
async fn each_part_only_sees_the_parameters_it_declares() {
    let process = process();
    let exposure = HookBinding::new::<hook::Configure, _, _>("configure", echo_args).with_takes(
        MapMeta::new().required("exposure", NumberMeta::new(NumberType::Float64, "exposure")),
    );
    let label = HookBinding::new::<hook::Configure, _, _>("configure", echo_args)
        .with_takes(MapMeta::new().element("label", StringMeta::new("label")));

    let controller = Controller::builder("DEV")
        .hook::<hook::Configure>()
        .part(TestPart::new("detector").with_binding(exposure))
        .part(TestPart::new("writer").with_binding(label))
        .build(&process)
        .unwrap();

    let contexts = controller.create_part_contexts();
    let results = controller
        .run_hook(
            HookId::of::<hook::Configure>(),
            &contexts,
            &[json!("ctx")],
            &params(&[("exposure", json!(0.5)), ("speed", json!(3))]),
        )
        .await
        .unwrap();

    assert_eq!(results["detector"], json!(["ctx", 0.5]));
    assert_eq!(results["writer"], json!(["ctx", null]));
}

#[tokio::test]
async fn bad_parameters_start_nothing() {
    let process = process();
    let started = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&started);
    let marker = HookBinding::new::<hook::Configure, _, _>("configure", move |_ctx, _args| {
        let flag = Arc::clone(&flag);
        async move {
            flag.store(true, Ordering::SeqCst);
            Ok(Value::Null)
        }
    });
    let strict = HookBinding::new::<hook::Configure, _, _>("configure", echo_args).with_takes(
        MapMeta::new().required("exposure", NumberMeta::new(NumberType::Float64, "exposure")),
    );

    let controller = Controller::builder("DEV")
        .hook::<hook::Configure>()
        .part(TestPart::new("first").with_binding(marker))
        .part(TestPart::new("second").with_binding(strict))
        .build(&process)
        .unwrap();

    let contexts = controller.create_part_contexts();
    let err = controller
        .start_hook(HookId::of::<hook::Configure>(), &contexts, &[], &Map::new())
        .unwrap_err();
    assert!(matches!(err, HookError::Validation(_)));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!started.load(Ordering::SeqCst));
}

#[tokio::test]
async fn missing_context_is_rejected() {
    let process = process();
    let controller = Controller::builder("DEV")
        .hook::<hook::Reset>()
        .part(TestPart::bound::<hook::Reset, _, _>("a", nap))
        .build(&process)
        .unwrap();

    let err = controller
        .start_hook(HookId::of::<hook::Reset>(), &PartContexts::default(), &[], &Map::new())
        .unwrap_err();
    assert_eq!(err, HookError::MissingContext { part: "a".into() });
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure policy
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn failure_stops_and_joins_the_others() {
    let process = process();
    let terminated = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&terminated);
    let sibling = HookBinding::new::<hook::Run, _, _>("run", move |ctx: HookContext, _args| {
        let flag = Arc::clone(&flag);
        async move {
            let outcome = ctx.sleep(Duration::from_secs(30)).await;
            flag.store(true, Ordering::SeqCst);
            outcome.map(|()| Value::Null)
        }
    });

    let controller = Controller::builder("DEV")
        .hook::<hook::Run>()
        .part(TestPart::new("slow").with_binding(sibling))
        .part(TestPart::bound::<hook::Run, _, _>("broken", fail))
        .build(&process)
        .unwrap();

    let contexts = controller.create_part_contexts();
    let err = controller
        .run_hook(HookId::of::<hook::Run>(), &contexts, &[], &Map::new())
        .await
        .unwrap_err();

    assert_eq!(err, HookError::failed("broken broke"));
    assert!(terminated.load(Ordering::SeqCst));
    assert!(!contexts.get("slow").unwrap().is_stopped());
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_hook_is_reported_as_failure() {
    let process = process();
    let controller = Controller::builder("DEV")
        .hook::<hook::Run>()
        .part(TestPart::bound::<hook::Run, _, _>("p", boom))
        .build(&process)
        .unwrap();

    let contexts = controller.create_part_contexts();
    let err = controller
        .run_hook(HookId::of::<hook::Run>(), &contexts, &[], &Map::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        HookError::Panicked {
            part: "p".into(),
            message: "wires crossed".into()
        }
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Abort policy
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn abort_returns_without_stopping_the_others() {
    let process = process();
    let (tx, mut rx) = mpsc::unbounded_channel::<HookContext>();
    let pending = HookBinding::new::<hook::Run, _, _>("run", move |ctx: HookContext, _args| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(ctx.clone());
            ctx.cancelled().await;
            Ok(Value::Null)
        }
    });
    let aborting = HookBinding::new::<hook::Run, _, _>("run", |_ctx, _args| async {
        Err(HookError::aborted("operator abort"))
    });

    let controller = Controller::builder("DEV")
        .hook::<hook::Run>()
        .part(TestPart::new("waiting").with_binding(pending))
        .part(TestPart::new("stopper").with_binding(aborting))
        .build(&process)
        .unwrap();

    let contexts = controller.create_part_contexts();
    let err = controller
        .run_hook(HookId::of::<hook::Run>(), &contexts, &[], &Map::new())
        .await
        .unwrap_err();
    assert!(err.is_abort());

    let waiting = rx.recv().await.unwrap();
    assert_eq!(waiting.part(), "waiting");
    assert!(!waiting.is_cancelled());

    contexts.stop_all();
    tokio::time::timeout(Duration::from_secs(5), waiting.cancelled())
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn detached_runner_does_not_keep_the_controller_alive() {
    let process = process();
    let (tx, mut rx) = mpsc::unbounded_channel::<bool>();
    let pending = HookBinding::new::<hook::Run, _, _>("run", move |ctx: HookContext, _args| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(ctx.controller().is_some());
            ctx.cancelled().await;
            let _ = tx.send(ctx.controller().is_some());
            Ok(Value::Null)
        }
    });
    let aborting = HookBinding::new::<hook::Run, _, _>("run", |_ctx, _args| async {
        Err(HookError::aborted("operator abort"))
    });

    let controller = Controller::builder("DEV")
        .hook::<hook::Run>()
        .part(TestPart::new("waiting").with_binding(pending))
        .part(TestPart::new("stopper").with_binding(aborting))
        .build(&process)
        .unwrap();

    let contexts = controller.create_part_contexts();
    let err = controller
        .run_hook(HookId::of::<hook::Run>(), &contexts, &[], &Map::new())
        .await
        .unwrap_err();
    assert!(err.is_abort());
    assert_eq!(rx.recv().await, Some(true));

    drop(controller);
    process.shutdown();
    contexts.stop_all();

    let alive = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(alive, Some(false));
}

#[tokio::test(flavor = "multi_thread")]
async fn stopping_a_part_context_aborts_its_runner() {
    let process = process();
    let controller = Controller::builder("DEV")
        .hook::<hook::Run>()
        .part(TestPart::bound::<hook::Run, _, _>("a", linger))
        .build(&process)
        .unwrap();

    let contexts = controller.create_part_contexts();
    let run = controller
        .start_hook(HookId::of::<hook::Run>(), &contexts, &[], &Map::new())
        .unwrap();
    assert_eq!(run.pending().collect::<Vec<_>>(), ["a"]);

    contexts.get("a").unwrap().stop();
    let err = controller.wait_hook(run).await.unwrap_err();
    assert!(err.is_abort());
}
