//! End-to-end tests driving a [`Workflow`] through [`Evaluator::run`]
//! against a fake [`StageInvoker`] — no worker, controller, or network I/O
//! involved.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::DagError;
use crate::eval::StageInvoker;
use crate::workflow::Workflow;

struct EchoAdder;

#[async_trait]
impl StageInvoker for EchoAdder {
    async fn call(&self, stage: &str, params: Value) -> Result<Value, DagError> {
        match stage {
            "add" => {
                let a = params["a"].as_i64().unwrap_or(0);
                let b = params["b"].as_i64().unwrap_or(0);
                Ok(json!({ "sum": a + b }))
            }
            other => Err(DagError::StageFailed {
                stage: other.to_string(),
                message: "no such stage in this fake".to_string(),
            }),
        }
    }
}

#[tokio::test]
async fn chain_of_two_calls_threads_output_into_input() {
    let wf = Workflow::new();
    let event = wf.get_event();
    let x = event.get("x", None);
    let y = event.get("y", Some(json!(10)));

    let first = wf.call("add", vec![("a", x.clone().into()), ("b", y.into())]);
    let second_input = first.project("sum");
    let second = wf.call("add", vec![("a", second_input.into()), ("b", 5i64.into())]);
    wf.end_with(second);

    let result = wf.execute(json!({ "x": 7 }), &EchoAdder).await.unwrap();
    assert_eq!(result, json!({ "sum": 22 }));
}

#[tokio::test]
async fn missing_required_parameter_is_rejected() {
    let wf = Workflow::new();
    let event = wf.get_event();
    let x = event.get("x", None);
    wf.end_with(x);

    let err = wf.execute(json!({}), &EchoAdder).await.unwrap_err();
    assert!(matches!(err, DagError::MissingParameter(key) if key == "x"));
}

#[tokio::test]
async fn fork_map_join_pipeline_counts_word_lengths() {
    let wf = Workflow::new();
    let event = wf.get_event();
    let text = event.get("text", None);

    let words = wf.func(
        |data| {
            let text = data.values().next().cloned().unwrap_or(Value::Null);
            let text = text.as_str().unwrap_or_default();
            Ok(Value::Array(text.split_whitespace().map(|w| json!(w)).collect()))
        },
        vec![text.into()],
        vec![],
    );

    let chunks = words.fork(3);
    let counted = chunks.map(|chunk| {
        let words = chunk.as_array().cloned().unwrap_or_default();
        Ok(json!(words.len()))
    });
    let total = counted.join(|flattened| {
        let total: i64 = flattened.as_array().unwrap().iter().map(|v| v.as_i64().unwrap()).sum();
        Ok(json!({ "total_words": total }))
    });
    wf.end_with(total);

    let result = wf
        .execute(json!({ "text": "hello world this is a happy day" }), &EchoAdder)
        .await
        .unwrap();
    assert_eq!(result, json!({ "total_words": 7 }));
}

#[tokio::test]
async fn stage_failure_propagates_as_dag_error() {
    let wf = Workflow::new();
    let ld = wf.call("missing-stage", vec![]);
    wf.end_with(ld);

    let err = wf.execute(json!({}), &EchoAdder).await.unwrap_err();
    assert!(matches!(err, DagError::StageFailed { stage, .. } if stage == "missing-stage"));
}

#[tokio::test]
async fn lambda_addition_operator_sums_two_values() {
    let wf = Workflow::new();
    let event = wf.get_event();
    let a = event.get("a", Some(json!(3)));
    let b = event.get("b", Some(json!(4)));
    let sum = a + b;
    wf.end_with(sum);

    let result = wf.execute(json!({}), &EchoAdder).await.unwrap();
    assert_eq!(result, json!(7));
}
