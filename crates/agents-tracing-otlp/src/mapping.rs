//! Trace item to OTLP span mapping.
//!
//! Mapping is a pure function of the input record. Span payloads of a known
//! kind (generation, function, agent) are translated to the OpenTelemetry
//! GenAI semantic conventions; any other payload has each of its keys
//! exported as one attribute. Missing or null values never produce an
//! attribute.

use crate::otlp::{AnyValue, KeyValue, OtlpSpan, Status};
use crate::span::{
    AgentSpanData, FunctionSpanData, GenerationSpanData, SpanData, SpanRecord, TraceItem,
};
use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};

/// GenAI semantic convention attribute keys and operation names.
#[allow(missing_docs)]
pub mod semconv {
    pub const OPERATION_NAME: &str = "gen_ai.operation.name";
    pub const REQUEST_MODEL: &str = "gen_ai.request.model";
    pub const REQUEST_TEMPERATURE: &str = "gen_ai.request.temperature";
    pub const REQUEST_TOP_P: &str = "gen_ai.request.top_p";
    pub const REQUEST_TOP_K: &str = "gen_ai.request.top_k";
    pub const REQUEST_FREQUENCY_PENALTY: &str = "gen_ai.request.frequency_penalty";
    pub const REQUEST_PRESENCE_PENALTY: &str = "gen_ai.request.presence_penalty";
    pub const REQUEST_MAX_TOKENS: &str = "gen_ai.request.max_tokens";
    pub const REQUEST_STOP_SEQUENCES: &str = "gen_ai.request.stop_sequences";
    pub const REQUEST_SEED: &str = "gen_ai.request.seed";
    pub const USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";
    pub const USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";
    pub const OUTPUT_TYPE: &str = "gen_ai.output.type";
    pub const TOOL_NAME: &str = "gen_ai.tool.name";
    pub const TOOL_CALL_ID: &str = "gen_ai.tool.call.id";
    pub const TOOL_DESCRIPTION: &str = "gen_ai.tool.description";
    pub const AGENT_NAME: &str = "gen_ai.agent.name";
    pub const ERROR_TYPE: &str = "error.type";

    pub const GENERATE_CONTENT: &str = "generate_content";
    pub const EXECUTE_TOOL: &str = "execute_tool";
    pub const INVOKE_AGENT: &str = "invoke_agent";
}

/// Name used when a span carries nothing better.
const DEFAULT_SPAN_NAME: &str = "span";

/// Maps one trace item to an OTLP span.
///
/// Returns `None` for traces, which are never exported on their own.
pub fn to_otlp_span(item: &TraceItem) -> Option<OtlpSpan> {
    item.as_span().map(span_to_otlp)
}

/// Maps every span in `items`, skipping traces.
pub fn to_otlp_spans(items: &[TraceItem]) -> Vec<OtlpSpan> {
    items.iter().filter_map(to_otlp_span).collect()
}

/// Maps a span record to an OTLP span.
pub fn span_to_otlp(span: &SpanRecord) -> OtlpSpan {
    let (name, mut attributes) = match &span.span_data {
        SpanData::Generation(data) => (
            operation_span_name(semconv::GENERATE_CONTENT, data.model.as_deref()),
            generation_attributes(data),
        ),
        SpanData::Function(data) => (
            operation_span_name(semconv::EXECUTE_TOOL, data.name.as_deref()),
            function_attributes(data),
        ),
        SpanData::Agent(data) => (
            operation_span_name(semconv::INVOKE_AGENT, data.name.as_deref()),
            agent_attributes(data),
        ),
        SpanData::Custom(map) => (custom_span_name(map), custom_attributes(map)),
    };

    let status = match &span.error {
        Some(error) => {
            if !error.message.is_empty() {
                attributes.push(KeyValue::new(semconv::ERROR_TYPE, error.message.as_str()));
            }
            Status::error(error.message.as_str())
        }
        None => Status::ok(),
    };

    OtlpSpan {
        trace_id: span.trace_id.clone(),
        span_id: span.id.clone(),
        parent_span_id: span.parent_id.clone(),
        name,
        start_time_unix_nano: span.started_at.as_deref().and_then(iso8601_to_unix_nanos),
        end_time_unix_nano: span.ended_at.as_deref().and_then(iso8601_to_unix_nanos),
        attributes,
        status,
    }
}

/// Converts a JSON value into a typed attribute.
///
/// Numbers become `doubleValue`, booleans `boolValue`, and everything else
/// `stringValue`. Null yields no attribute.
pub fn attribute(key: &str, value: &Value) -> Option<KeyValue> {
    let value = match value {
        Value::Null => return None,
        Value::Bool(b) => AnyValue::BoolValue(*b),
        Value::Number(n) => match n.as_f64() {
            Some(f) => AnyValue::DoubleValue(f),
            None => AnyValue::StringValue(n.to_string()),
        },
        other => AnyValue::StringValue(stringify(other)),
    };
    Some(KeyValue::new(key, value))
}

/// Parses an ISO 8601 timestamp into nanoseconds since the Unix epoch.
///
/// Precision is truncated to milliseconds. Timestamps without an offset are
/// read as UTC. Unparseable or pre-epoch input yields `None`.
pub fn iso8601_to_unix_nanos(timestamp: &str) -> Option<u64> {
    let millis = match DateTime::parse_from_rfc3339(timestamp) {
        Ok(parsed) => parsed.timestamp_millis(),
        Err(_) => NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()?
            .and_utc()
            .timestamp_millis(),
    };
    u64::try_from(millis).ok()?.checked_mul(1_000_000)
}

fn operation_span_name(operation: &str, subject: Option<&str>) -> String {
    format!("{} {}", operation, subject.unwrap_or_default())
        .trim()
        .to_string()
}

fn custom_span_name(map: &Map<String, Value>) -> String {
    map.get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_SPAN_NAME)
        .to_string()
}

/// Attributes follow the payload's key order.
fn custom_attributes(map: &Map<String, Value>) -> Vec<KeyValue> {
    map.iter()
        .filter_map(|(key, value)| attribute(key, value))
        .collect()
}

fn generation_attributes(data: &GenerationSpanData) -> Vec<KeyValue> {
    let mut attrs = vec![KeyValue::new(
        semconv::OPERATION_NAME,
        semconv::GENERATE_CONTENT,
    )];

    push_str(&mut attrs, semconv::REQUEST_MODEL, data.model.as_deref());

    if let Some(config) = &data.model_config {
        push_f64(&mut attrs, semconv::REQUEST_TEMPERATURE, config.temperature);
        push_f64(&mut attrs, semconv::REQUEST_TOP_P, config.top_p);
        push_f64(&mut attrs, semconv::REQUEST_TOP_K, config.top_k);
        push_f64(
            &mut attrs,
            semconv::REQUEST_FREQUENCY_PENALTY,
            config.frequency_penalty,
        );
        push_f64(
            &mut attrs,
            semconv::REQUEST_PRESENCE_PENALTY,
            config.presence_penalty,
        );
        push_f64(&mut attrs, semconv::REQUEST_MAX_TOKENS, config.max_tokens);
        if let Some(stop) = config.stop_sequences.as_ref().filter(|s| !s.is_empty()) {
            attrs.push(KeyValue::new(semconv::REQUEST_STOP_SEQUENCES, stop.join(",")));
        }
        push_f64(&mut attrs, semconv::REQUEST_SEED, config.seed);
    }

    if let Some(usage) = &data.usage {
        push_f64(&mut attrs, semconv::USAGE_INPUT_TOKENS, usage.input_tokens);
        push_f64(&mut attrs, semconv::USAGE_OUTPUT_TOKENS, usage.output_tokens);
    }

    push_str(
        &mut attrs,
        semconv::OUTPUT_TYPE,
        data.output.as_deref().and_then(guess_output_type),
    );

    attrs
}

fn function_attributes(data: &FunctionSpanData) -> Vec<KeyValue> {
    let mut attrs = vec![KeyValue::new(
        semconv::OPERATION_NAME,
        semconv::EXECUTE_TOOL,
    )];
    push_str(&mut attrs, semconv::TOOL_NAME, data.name.as_deref());
    push_str(&mut attrs, semconv::TOOL_CALL_ID, data.call_id.as_deref());
    push_str(
        &mut attrs,
        semconv::TOOL_DESCRIPTION,
        data.description.as_deref(),
    );
    attrs
}

fn agent_attributes(data: &AgentSpanData) -> Vec<KeyValue> {
    let mut attrs = vec![KeyValue::new(
        semconv::OPERATION_NAME,
        semconv::INVOKE_AGENT,
    )];
    push_str(&mut attrs, semconv::AGENT_NAME, data.name.as_deref());
    push_str(&mut attrs, semconv::OUTPUT_TYPE, data.output_type.as_deref());
    attrs
}

/// Infers the output modality from the first response item.
fn guess_output_type(output: &[Value]) -> Option<&'static str> {
    let first = output.first()?;
    if first.get("type").and_then(Value::as_str) != Some("message") {
        return None;
    }
    let content = first.get("content")?.as_array()?.first()?;
    match content.get("type")?.as_str()? {
        "output_text" => Some("text"),
        "image_url" => Some("image"),
        "speech" => Some("speech"),
        _ => None,
    }
}

fn push_str(attrs: &mut Vec<KeyValue>, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        attrs.push(KeyValue::new(key, value));
    }
}

fn push_f64(attrs: &mut Vec<KeyValue>, key: &str, value: Option<f64>) {
    if let Some(value) = value {
        attrs.push(KeyValue::new(key, value));
    }
}

/// Renders a non-null JSON value as attribute text.
///
/// Arrays are flattened to their comma-joined elements (null elements render
/// as empty strings); objects keep their compact JSON form.
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}
