//! A controller method driving a lifecycle hook end to end.


use std::time::{Duration, Instant};

use serde_json::{Map, Value, json};
use tessera_controller::HandlerResult;
use tessera_controller::prelude::*;
use tessera_model::{AttributeModel, MethodModel, NumberMeta, NumberType, Response};
use test_utils::{TestPart, post, process};

const HOMING: Duration = Duration::from_millis(80);

async fn home(ctx: HookContext, _args: Vec<Value>) -> Result<Value, HookError> {
    ctx.sleep(HOMING).await?;
    Ok(json!({ "homed": true }))
}

async fn reset(controller: Controller, _args: Vec<Value>) -> HandlerResult {
    let contexts = controller.create_part_contexts();
    let results = controller
        .run_hook(HookId::of::<hook::Reset>(), &contexts, &[], &Map::new())
        .await?;
    Ok(json!(results))
}

fn position() -> AttributeModel {
    AttributeModel::new(NumberMeta::new(NumberType::Float64, "x"))
}

fn stage(process: &Process) -> Controller {
    Controller::builder("STAGE")
        .hook::<hook::Reset>()
        .method(Field::method("reset", MethodModel::new("reset", "Home every axis"), reset))
        .part(TestPart::new("A").with_attribute("x", position()))
        .part(TestPart::bound::<hook::Reset, _, _>("B", home))
        .build(process)
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_returns_only_after_the_bound_part_finishes() {
    let process = process();
    let _controller = stage(&process);

    let started = Instant::now();
    let response = post(&process, &["STAGE", "reset"], Map::new()).await;

    assert!(started.elapsed() >= HOMING);
    assert_eq!(
        response,
        Response::Return {
            id: 1,
            value: json!({ "B": { "homed": true } })
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn hook_failure_surfaces_as_an_error_response() {
    async fn jam(_ctx: HookContext, _args: Vec<Value>) -> Result<Value, HookError> {
        Err(HookError::failed("axis jammed"))
    }

    let process = process();
    let _controller = Controller::builder("STAGE")
        .hook::<hook::Reset>()
        .method(Field::method("reset", MethodModel::new("reset", ""), reset))
        .part(TestPart::bound::<hook::Reset, _, _>("B", home))
        .part(TestPart::bound::<hook::Reset, _, _>("C", jam))
        .build(&process)
        .unwrap();

    let response = post(&process, &["STAGE", "reset"], Map::new()).await;
    assert_eq!(
        response,
        Response::Error {
            id: 1,
            message: "axis jammed".into()
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn contexts_survive_across_runs() {
    let process = process();
    let controller = stage(&process);
    let contexts = controller.create_part_contexts();

    for _ in 0..2 {
        let results = controller
            .run_hook(HookId::of::<hook::Reset>(), &contexts, &[], &Map::new())
            .await
            .unwrap();
        assert_eq!(results["B"], json!({ "homed": true }));
    }
    assert!(contexts.iter().all(|context| !context.is_stopped()));
}
