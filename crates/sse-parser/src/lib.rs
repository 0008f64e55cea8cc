//! Parser for the upstream workflow engine's `text/event-stream` response
//! body.
//!
//! The upstream does not keep the connection open for genuine server push;
//! the whole body is read up front and split into lines. Only lines
//! prefixed `data: ` carry an event; everything else (blank lines, SSE
//! comments, a trailing `event: ping`) is ignored. Each event is a JSON
//! object with an `event` discriminator and either a nested `data` object
//! (older upstream versions) or the event fields at the top level (current
//! versions) - both are accepted.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// One `node_started`/`node_finished` pair, merged by node-execution id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeExecution {
    pub id: String,
    pub node_id: String,
    pub node_type: String,
    pub title: String,
    pub index: i64,
    pub inputs: Option<Map<String, Value>>,
    pub created_at: i64,
    pub status: String,
    pub error: Option<String>,
    pub elapsed_time: f64,
    pub outputs: Option<Map<String, Value>>,
    pub finished_at: i64,
}

/// Accumulated result of a parsed workflow run, ready to be stored as a
/// task's `result` JSON blob.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowResult {
    pub workflow_run_id: String,
    pub workflow_id: String,
    pub sequence_number: i64,
    pub created_at: i64,
    pub status: String,
    pub outputs: Map<String, Value>,
    pub error: String,
    pub elapsed_time: f64,
    pub total_tokens: i64,
    pub total_steps: i64,
    pub exceptions_count: i64,
    pub finished_at: i64,
    pub nodes: Vec<NodeExecution>,
}

impl WorkflowResult {
    /// True once a terminal `workflow_finished` event landed with a
    /// `succeeded` status and no `error`.
    pub fn succeeded(&self) -> bool {
        self.status == "succeeded" && self.error.is_empty()
    }
}

/// Parses a full SSE response body into a [`WorkflowResult`]. Malformed or
/// unrecognized lines are skipped rather than failing the whole parse,
/// matching the upstream's tolerant behavior - a single corrupt keep-alive
/// line should not discard an otherwise complete stream.
pub fn parse_sse_stream(body: &str) -> WorkflowResult {
    let mut result = WorkflowResult::default();
    let mut nodes: HashMap<String, NodeExecution> = HashMap::new();

    for line in body.lines() {
        let line = line.trim();
        let Some(payload) = line.strip_prefix("data: ") else {
            continue;
        };

        let Ok(event) = serde_json::from_str::<Value>(payload) else {
            tracing::debug!(payload, "skipping unparsable SSE line");
            continue;
        };

        let Some(event_type) = event.get("event").and_then(Value::as_str) else {
            continue;
        };

        // Older upstream versions nest fields under `data`; current
        // versions put them at the top level of the event object.
        let data = event
            .get("data")
            .and_then(Value::as_object)
            .unwrap_or_else(|| event.as_object().expect("json events are always objects"));

        match event_type {
            "workflow_started" => apply_workflow_started(&mut result, data),
            "node_started" => apply_node_started(&mut nodes, data),
            "node_finished" => apply_node_finished(&mut nodes, data),
            "workflow_finished" => apply_workflow_finished(&mut result, data),
            "message" => apply_message(&mut result, data),
            _ => {}
        }
    }

    result.nodes = nodes.into_values().collect();
    result.nodes.sort_by_key(|n| n.index);
    result
}

fn str_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}

fn i64_field(data: &Map<String, Value>, key: &str) -> Option<i64> {
    data.get(key).and_then(Value::as_f64).map(|n| n as i64)
}

fn f64_field(data: &Map<String, Value>, key: &str) -> Option<f64> {
    data.get(key).and_then(Value::as_f64)
}

fn obj_field(data: &Map<String, Value>, key: &str) -> Option<Map<String, Value>> {
    data.get(key).and_then(Value::as_object).cloned()
}

fn apply_workflow_started(result: &mut WorkflowResult, data: &Map<String, Value>) {
    if let Some(id) = str_field(data, "id") {
        result.workflow_run_id = id;
    }
    if let Some(id) = str_field(data, "workflow_id") {
        result.workflow_id = id;
    }
    if let Some(n) = i64_field(data, "sequence_number") {
        result.sequence_number = n;
    }
    if let Some(t) = i64_field(data, "created_at") {
        result.created_at = t;
    }
}

fn apply_node_started(nodes: &mut HashMap<String, NodeExecution>, data: &Map<String, Value>) {
    let Some(id) = str_field(data, "id") else {
        return;
    };
    let node = NodeExecution {
        id: id.clone(),
        node_id: str_field(data, "node_id").unwrap_or_default(),
        node_type: str_field(data, "node_type").unwrap_or_default(),
        title: str_field(data, "title").unwrap_or_default(),
        index: i64_field(data, "index").unwrap_or_default(),
        inputs: obj_field(data, "inputs"),
        created_at: i64_field(data, "created_at").unwrap_or_default(),
        ..Default::default()
    };
    nodes.insert(id, node);
}

fn apply_node_finished(nodes: &mut HashMap<String, NodeExecution>, data: &Map<String, Value>) {
    let Some(id) = str_field(data, "id") else {
        return;
    };
    // A `node_finished` with no matching `node_started` still carries the
    // full node identity; build a fresh entry rather than dropping it.
    let node = nodes.entry(id.clone()).or_insert_with(|| NodeExecution {
        id: id.clone(),
        node_id: str_field(data, "node_id").unwrap_or_default(),
        node_type: str_field(data, "node_type").unwrap_or_default(),
        title: str_field(data, "title").unwrap_or_default(),
        index: i64_field(data, "index").unwrap_or_default(),
        ..Default::default()
    });

    if let Some(status) = str_field(data, "status") {
        node.status = status;
    }
    if let Some(error) = str_field(data, "error").filter(|e| !e.is_empty()) {
        node.error = Some(error);
    }
    if let Some(elapsed) = f64_field(data, "elapsed_time") {
        node.elapsed_time = elapsed;
    }
    if let Some(outputs) = obj_field(data, "outputs") {
        node.outputs = Some(outputs);
    }
    if let Some(t) = i64_field(data, "finished_at") {
        node.finished_at = t;
    }
}

fn apply_workflow_finished(result: &mut WorkflowResult, data: &Map<String, Value>) {
    if let Some(status) = str_field(data, "status") {
        result.status = status;
    }
    if let Some(outputs) = obj_field(data, "outputs") {
        result.outputs = outputs;
    }
    if let Some(error) = str_field(data, "error") {
        result.error = error;
    }
    if let Some(elapsed) = f64_field(data, "elapsed_time") {
        result.elapsed_time = elapsed;
    }
    if let Some(n) = i64_field(data, "total_tokens") {
        result.total_tokens = n;
    }
    if let Some(n) = i64_field(data, "total_steps") {
        result.total_steps = n;
    }
    if let Some(n) = i64_field(data, "exceptions_count") {
        result.exceptions_count = n;
    }
    if let Some(t) = i64_field(data, "finished_at") {
        result.finished_at = t;
    }
}

/// `message` events stream incremental text for completion-mode apps; each
/// chunk's `answer` is appended to `outputs.text` rather than replacing it.
fn apply_message(result: &mut WorkflowResult, data: &Map<String, Value>) {
    if let Some(answer) = str_field(data, "answer").filter(|a| !a.is_empty()) {
        let existing = result
            .outputs
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let merged = format!("{existing}{answer}");
        result.outputs.insert("text".to_string(), Value::String(merged));
    }
    if result.workflow_run_id.is_empty() {
        if let Some(id) = str_field(data, "message_id") {
            result.workflow_run_id = id;
        }
    }
    if let Some(t) = i64_field(data, "created_at") {
        result.created_at = t;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_workflow_lifecycle() {
        let body = concat!(
            "data: {\"event\":\"workflow_started\",\"id\":\"run-1\",\"workflow_id\":\"wf-1\",\"created_at\":100}\n",
            "data: {\"event\":\"node_started\",\"id\":\"n1\",\"node_id\":\"start\",\"index\":0,\"node_type\":\"start\"}\n",
            "data: {\"event\":\"node_finished\",\"id\":\"n1\",\"status\":\"succeeded\",\"elapsed_time\":0.5}\n",
            "data: {\"event\":\"workflow_finished\",\"status\":\"succeeded\",\"outputs\":{\"text\":\"hi\"},\"total_tokens\":42}\n",
        );

        let result = parse_sse_stream(body);
        assert_eq!(result.workflow_run_id, "run-1");
        assert_eq!(result.status, "succeeded");
        assert!(result.succeeded());
        assert_eq!(result.total_tokens, 42);
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].status, "succeeded");
    }

    #[test]
    fn skips_unparsable_and_non_data_lines() {
        let body = "event: ping\n\ndata: not json at all\ndata: {\"event\":\"workflow_finished\",\"status\":\"failed\",\"error\":\"boom\"}\n";
        let result = parse_sse_stream(body);
        assert_eq!(result.status, "failed");
        assert_eq!(result.error, "boom");
        assert!(!result.succeeded());
    }

    #[test]
    fn merges_nested_data_field_for_legacy_events() {
        let body = "data: {\"event\":\"workflow_started\",\"data\":{\"id\":\"run-2\",\"workflow_id\":\"wf-2\"}}\n";
        let result = parse_sse_stream(body);
        assert_eq!(result.workflow_run_id, "run-2");
        assert_eq!(result.workflow_id, "wf-2");
    }

    #[test]
    fn message_events_accumulate_text_across_chunks() {
        let body = concat!(
            "data: {\"event\":\"message\",\"answer\":\"hel\",\"message_id\":\"m1\"}\n",
            "data: {\"event\":\"message\",\"answer\":\"lo\"}\n",
        );
        let result = parse_sse_stream(body);
        assert_eq!(result.outputs.get("text").unwrap().as_str().unwrap(), "hello");
        assert_eq!(result.workflow_run_id, "m1");
    }

    #[test]
    fn message_preserves_existing_run_id_across_later_chunks() {
        let body = concat!(
            "data: {\"event\":\"workflow_started\",\"id\":\"run-1\",\"workflow_id\":\"wf-1\"}\n",
            "data: {\"event\":\"message\",\"answer\":\"hel\",\"message_id\":\"m1\"}\n",
            "data: {\"event\":\"message\",\"answer\":\"lo\",\"message_id\":\"m2\"}\n",
        );
        let result = parse_sse_stream(body);
        assert_eq!(result.outputs.get("text").unwrap().as_str().unwrap(), "hello");
        assert_eq!(result.workflow_run_id, "run-1");
    }

    #[test]
    fn node_finished_without_started_still_builds_a_node() {
        let body = "data: {\"event\":\"node_finished\",\"id\":\"orphan\",\"status\":\"succeeded\"}\n";
        let result = parse_sse_stream(body);
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].id, "orphan");
    }
}
