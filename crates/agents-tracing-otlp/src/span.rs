//! Trace and span records handed over by the agent tracing runtime.
//!
//! Records arrive in the runtime's JSON shape, where the `object` field
//! tells traces and spans apart and the span payload is discriminated by its
//! own `type` field. Typed payload fields are parsed leniently: a value of
//! the wrong JSON type becomes `None` instead of failing the whole record.

use serde::Deserialize;
use serde::de::{DeserializeOwned, Deserializer};
use serde_json::{Map, Value};

/// A single item produced by the tracing runtime.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "object")]
pub enum TraceItem {
    /// Root container correlating a set of spans.
    #[serde(rename = "trace")]
    Trace(TraceRecord),
    /// One timed unit of work.
    #[serde(rename = "trace.span")]
    Span(SpanRecord),
}

impl TraceItem {
    /// Returns the span record, if this item is a span.
    pub fn as_span(&self) -> Option<&SpanRecord> {
        match self {
            TraceItem::Span(span) => Some(span),
            TraceItem::Trace(_) => None,
        }
    }
}

impl From<TraceRecord> for TraceItem {
    fn from(trace: TraceRecord) -> Self {
        TraceItem::Trace(trace)
    }
}

impl From<SpanRecord> for TraceItem {
    fn from(span: SpanRecord) -> Self {
        TraceItem::Span(span)
    }
}

/// A trace record. Traces are never exported on their own.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TraceRecord {
    /// Trace identifier.
    pub id: String,
    /// Name of the workflow that produced the trace.
    pub workflow_name: Option<String>,
    /// Identifier linking related traces, e.g. a conversation thread.
    pub group_id: Option<String>,
    /// Free-form metadata attached by the application.
    pub metadata: Option<Map<String, Value>>,
}

impl TraceRecord {
    /// Creates a trace record with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// A span record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SpanRecord {
    /// Span identifier.
    pub id: String,
    /// Identifier of the owning trace.
    pub trace_id: String,
    /// Identifier of the parent span.
    #[serde(default, deserialize_with = "lenient")]
    pub parent_id: Option<String>,
    /// ISO 8601 start time.
    #[serde(default, deserialize_with = "lenient")]
    pub started_at: Option<String>,
    /// ISO 8601 end time.
    #[serde(default, deserialize_with = "lenient")]
    pub ended_at: Option<String>,
    /// Kind-specific payload.
    #[serde(default)]
    pub span_data: SpanData,
    /// Error recorded on the span.
    ///
    /// Accepts either an error object or a bare message string.
    #[serde(default, deserialize_with = "span_error")]
    pub error: Option<SpanError>,
}

impl SpanRecord {
    /// Creates a span record with no parent, timing or error.
    pub fn new(id: impl Into<String>, trace_id: impl Into<String>, span_data: SpanData) -> Self {
        Self {
            id: id.into(),
            trace_id: trace_id.into(),
            span_data,
            ..Default::default()
        }
    }

    /// Sets the parent span identifier.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Sets the ISO 8601 start and end times.
    #[must_use]
    pub fn with_times(mut self, started_at: impl Into<String>, ended_at: impl Into<String>) -> Self {
        self.started_at = Some(started_at.into());
        self.ended_at = Some(ended_at.into());
        self
    }

    /// Records an error message on the span.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(SpanError {
            message: message.into(),
            data: None,
        });
        self
    }
}

/// Error recorded on a span.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SpanError {
    /// Human readable error message. Empty when none was recorded.
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub message: String,
    /// Additional structured error details.
    #[serde(default, deserialize_with = "lenient")]
    pub data: Option<Map<String, Value>>,
}

/// Kind-specific span payload.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum SpanData {
    /// A model generation call.
    Generation(GenerationSpanData),
    /// A tool or function call.
    Function(FunctionSpanData),
    /// An agent invocation.
    Agent(AgentSpanData),
    /// Any other payload, kept as its flat key/value map.
    Custom(Map<String, Value>),
}

impl Default for SpanData {
    fn default() -> Self {
        SpanData::Custom(Map::new())
    }
}

impl SpanData {
    /// Builds a payload from an arbitrary JSON value, dispatching on `type`.
    ///
    /// Non-object values produce an empty custom payload.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(map) = value else {
            return SpanData::default();
        };

        match map.get("type").and_then(Value::as_str) {
            Some("generation") => {
                SpanData::Generation(serde_json::from_value(Value::Object(map)).unwrap_or_default())
            }
            Some("function") => {
                SpanData::Function(serde_json::from_value(Value::Object(map)).unwrap_or_default())
            }
            Some("agent") => {
                SpanData::Agent(serde_json::from_value(Value::Object(map)).unwrap_or_default())
            }
            _ => SpanData::Custom(map),
        }
    }
}

impl<'de> Deserialize<'de> for SpanData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(SpanData::from_value)
    }
}

/// Payload of a model generation span.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenerationSpanData {
    /// Requested model name.
    #[serde(default, deserialize_with = "lenient")]
    pub model: Option<String>,
    /// Sampling and length knobs sent with the request.
    #[serde(default, deserialize_with = "lenient")]
    pub model_config: Option<ModelConfig>,
    /// Token accounting reported by the model.
    #[serde(default, deserialize_with = "lenient")]
    pub usage: Option<Usage>,
    /// Response items produced by the model.
    #[serde(default, deserialize_with = "lenient")]
    pub output: Option<Vec<Value>>,
}

/// Model request configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelConfig {
    /// Sampling temperature.
    #[serde(default, deserialize_with = "lenient")]
    pub temperature: Option<f64>,
    /// Nucleus sampling probability mass.
    #[serde(default, deserialize_with = "lenient")]
    pub top_p: Option<f64>,
    /// Top-k sampling cutoff.
    #[serde(default, deserialize_with = "lenient")]
    pub top_k: Option<f64>,
    /// Frequency penalty.
    #[serde(default, deserialize_with = "lenient")]
    pub frequency_penalty: Option<f64>,
    /// Presence penalty.
    #[serde(default, deserialize_with = "lenient")]
    pub presence_penalty: Option<f64>,
    /// Maximum number of tokens to generate.
    #[serde(default, deserialize_with = "lenient")]
    pub max_tokens: Option<f64>,
    /// Sequences that stop generation.
    #[serde(default, deserialize_with = "lenient")]
    pub stop_sequences: Option<Vec<String>>,
    /// Sampling seed.
    #[serde(default, deserialize_with = "lenient")]
    pub seed: Option<f64>,
}

/// Token usage of a generation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Usage {
    /// Prompt tokens consumed.
    #[serde(
        default,
        rename = "inputTokens",
        alias = "input_tokens",
        deserialize_with = "lenient"
    )]
    pub input_tokens: Option<f64>,
    /// Completion tokens produced.
    #[serde(
        default,
        rename = "outputTokens",
        alias = "output_tokens",
        deserialize_with = "lenient"
    )]
    pub output_tokens: Option<f64>,
}

/// Payload of a tool call span.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FunctionSpanData {
    /// Tool name.
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    /// Identifier of the model's tool call.
    #[serde(default, deserialize_with = "lenient")]
    pub call_id: Option<String>,
    /// Tool description shown to the model.
    #[serde(default, deserialize_with = "lenient")]
    pub description: Option<String>,
}

/// Payload of an agent invocation span.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentSpanData {
    /// Agent name.
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    /// Declared output type of the agent.
    #[serde(default, deserialize_with = "lenient")]
    pub output_type: Option<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    lenient(deserializer).map(Option::unwrap_or_default)
}

fn span_error<'de, D>(deserializer: D) -> Result<Option<SpanError>, D::Error>
where
    D: Deserializer<'de>,
{
    let error = match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(message) => Some(SpanError {
            message,
            data: None,
        }),
        Value::Object(map) => Some(serde_json::from_value(Value::Object(map)).unwrap_or_default()),
        other => Some(SpanError {
            message: other.to_string(),
            data: None,
        }),
    };
    Ok(error)
}
