//! Shared attribute types (`opentelemetry.proto.common.v1`).

/// A scalar attribute value.
///
/// The upstream `AnyValue` also carries array/kvlist/bytes variants; the
/// extractor grammar only ever reads scalars, so those variants are not
/// modelled. Unknown variants decode as `value: None`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AnyValue {
    #[prost(oneof = "any_value::Value", tags = "1, 2, 3, 4")]
    pub value: Option<any_value::Value>,
}

pub mod any_value {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(string, tag = "1")]
        StringValue(String),
        #[prost(bool, tag = "2")]
        BoolValue(bool),
        #[prost(int64, tag = "3")]
        IntValue(i64),
        #[prost(double, tag = "4")]
        DoubleValue(f64),
    }
}

impl AnyValue {
    pub fn string(s: impl Into<String>) -> Self {
        Self {
            value: Some(any_value::Value::StringValue(s.into())),
        }
    }

    /// The string form of this value, or `None` for non-string variants.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Some(any_value::Value::StringValue(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// A key/value attribute pair.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyValue {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<AnyValue>,
}

impl KeyValue {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(AnyValue::string(value)),
        }
    }
}

/// Look up the first attribute named `key` and return its string value.
pub fn find_string<'a>(attributes: &'a [KeyValue], key: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|kv| kv.key == key)
        .and_then(|kv| kv.value.as_ref())
        .and_then(|v| v.as_str())
}

/// Collect every string value carried by attributes named `key`.
///
/// A batch may legitimately repeat a key (e.g. several `host` attributes on
/// one resource); extraction needs all candidates, not just the first.
pub fn collect_strings<'a>(attributes: &'a [KeyValue], key: &str) -> Vec<&'a str> {
    attributes
        .iter()
        .filter(|kv| kv.key == key)
        .filter_map(|kv| kv.value.as_ref())
        .filter_map(|v| v.as_str())
        .collect()
}

/// Instrumentation scope descriptor.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstrumentationScope {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub version: String,
    #[prost(message, repeated, tag = "3")]
    pub attributes: Vec<KeyValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_string() {
        let attrs = vec![
            KeyValue::string("host", "srv-1"),
            KeyValue::string("service", "ping"),
        ];
        assert_eq!(find_string(&attrs, "host"), Some("srv-1"));
        assert_eq!(find_string(&attrs, "service"), Some("ping"));
        assert_eq!(find_string(&attrs, "missing"), None);
    }

    #[test]
    fn test_collect_strings_repeated_key() {
        let attrs = vec![
            KeyValue::string("host", "a"),
            KeyValue::string("host", "b"),
            KeyValue::string("unit", "ms"),
        ];
        assert_eq!(collect_strings(&attrs, "host"), vec!["a", "b"]);
    }

    #[test]
    fn test_non_string_value_is_skipped() {
        let attrs = vec![KeyValue {
            key: "host".into(),
            value: Some(AnyValue {
                value: Some(any_value::Value::IntValue(7)),
            }),
        }];
        assert_eq!(find_string(&attrs, "host"), None);
    }
}
