//! OTLP/JSON trace request model.
//!
//! Only the subset of the OTLP trace schema this exporter emits is modelled.
//! Field names serialise in the camelCase form used by the OTLP/JSON
//! encoding, and absent optional fields are left out of the document.

use serde::{Serialize, Serializer};

/// Instrumentation scope name reported with every batch.
pub const SCOPE_NAME: &str = "agents-tracing-otlp";
/// Instrumentation scope version reported with every batch.
pub const SCOPE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Body of an OTLP trace export request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTraceRequest {
    /// Spans grouped by resource.
    pub resource_spans: Vec<ResourceSpans>,
}

impl ExportTraceRequest {
    /// Wraps spans in a single resource and scope.
    pub fn from_spans(resource: Option<Resource>, spans: Vec<OtlpSpan>) -> Self {
        Self {
            resource_spans: vec![ResourceSpans {
                resource,
                scope_spans: vec![ScopeSpans {
                    scope: Some(InstrumentationScope::default()),
                    spans,
                }],
            }],
        }
    }

    /// Returns the total number of spans in the request.
    pub fn span_count(&self) -> usize {
        self.resource_spans
            .iter()
            .flat_map(|rs| &rs.scope_spans)
            .map(|ss| ss.spans.len())
            .sum()
    }
}

/// Spans produced by one resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    /// Entity producing the spans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
    /// Spans grouped by instrumentation scope.
    pub scope_spans: Vec<ScopeSpans>,
}

/// Resource attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resource {
    /// Attributes describing the resource, e.g. `service.name`.
    pub attributes: Vec<KeyValue>,
}

/// Spans produced by one instrumentation scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScopeSpans {
    /// Instrumentation scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<InstrumentationScope>,
    /// Spans in this scope.
    pub spans: Vec<OtlpSpan>,
}

/// Instrumentation scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentationScope {
    /// Scope name.
    pub name: String,
    /// Scope version.
    pub version: String,
}

impl Default for InstrumentationScope {
    fn default() -> Self {
        Self {
            name: SCOPE_NAME.to_string(),
            version: SCOPE_VERSION.to_string(),
        }
    }
}

/// A span in OTLP/JSON form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtlpSpan {
    /// Identifier of the owning trace.
    pub trace_id: String,
    /// Span identifier.
    pub span_id: String,
    /// Identifier of the parent span.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    /// Span name, never empty.
    pub name: String,
    /// Start time in nanoseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time_unix_nano: Option<u64>,
    /// End time in nanoseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time_unix_nano: Option<u64>,
    /// Span attributes.
    pub attributes: Vec<KeyValue>,
    /// Span status.
    pub status: Status,
}

impl OtlpSpan {
    /// Returns the value of the attribute with the given key.
    pub fn attribute(&self, key: &str) -> Option<&AnyValue> {
        self.attributes
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| &kv.value)
    }
}

/// A key/value attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyValue {
    /// Attribute key.
    pub key: String,
    /// Attribute value.
    pub value: AnyValue,
}

impl KeyValue {
    /// Creates a new attribute.
    pub fn new(key: impl Into<String>, value: impl Into<AnyValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Attribute value, serialised as exactly one of `stringValue`,
/// `doubleValue` or `boolValue`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnyValue {
    /// String value.
    StringValue(String),
    /// Floating point value. All numbers are exported this way.
    DoubleValue(f64),
    /// Boolean value.
    BoolValue(bool),
}

impl AnyValue {
    /// Returns the string value, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnyValue::StringValue(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric value, if this is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AnyValue::DoubleValue(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AnyValue::BoolValue(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<String> for AnyValue {
    fn from(value: String) -> Self {
        AnyValue::StringValue(value)
    }
}

impl From<&str> for AnyValue {
    fn from(value: &str) -> Self {
        AnyValue::StringValue(value.to_string())
    }
}

impl From<f64> for AnyValue {
    fn from(value: f64) -> Self {
        AnyValue::DoubleValue(value)
    }
}

impl From<bool> for AnyValue {
    fn from(value: bool) -> Self {
        AnyValue::BoolValue(value)
    }
}

/// Span status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Status {
    /// Status code.
    pub code: StatusCode,
    /// Error description, only set on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Status {
    /// A successful status.
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: None,
        }
    }

    /// An error status carrying the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Error,
            message: Some(message.into()),
        }
    }
}

/// OTLP status code, serialised as its numeric value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusCode {
    /// The operation completed successfully (1).
    #[default]
    Ok = 1,
    /// The operation failed (2).
    Error = 2,
}

impl Serialize for StatusCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(*self as u8)
    }
}
