//! Conversion of OTLP attribute values into store values.

use std::borrow::Cow;
use std::collections::BTreeMap;

use opentelemetry_proto::tonic::common::v1::{any_value::Value as AnyValueKind, AnyValue};
use spattex_store::Value;

/// Convert an OTLP `AnyValue` into a [`Value`].
///
/// Arrays and key-value lists are converted recursively into `List` and
/// `Map`, keeping every element: an empty element becomes [`Value::Null`], so
/// list positions and map keys survive. Returns `None` for an empty
/// top-level value (no variant set); such attributes are not written to the
/// row.
pub fn normalize_value(value: &AnyValue) -> Option<Value> {
    let normalized = match value.value.as_ref()? {
        AnyValueKind::BoolValue(b) => Value::Bool(*b),
        AnyValueKind::IntValue(i) => Value::Int(*i),
        AnyValueKind::DoubleValue(d) => Value::Float(*d),
        AnyValueKind::StringValue(s) => Value::String(s.clone()),
        AnyValueKind::BytesValue(b) => Value::Bytes(b.clone()),
        AnyValueKind::ArrayValue(arr) => {
            Value::List(arr.values.iter().map(normalize_element).collect())
        }
        AnyValueKind::KvlistValue(kvlist) => {
            let map: BTreeMap<String, Value> = kvlist
                .values
                .iter()
                .map(|kv| {
                    let value = kv.value.as_ref().map_or(Value::Null, normalize_element);
                    (kv.key.clone(), value)
                })
                .collect();
            Value::Map(map)
        }
    };
    Some(normalized)
}

fn normalize_element(value: &AnyValue) -> Value {
    normalize_value(value).unwrap_or(Value::Null)
}

/// Rewrite an attribute key into a valid field name (`.` becomes `_`).
pub fn sanitize_field_name(key: &str) -> Cow<'_, str> {
    if key.contains('.') {
        Cow::Owned(key.replace('.', "_"))
    } else {
        Cow::Borrowed(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::common::v1::{ArrayValue, KeyValue, KeyValueList};

    fn any(value: AnyValueKind) -> AnyValue {
        AnyValue { value: Some(value) }
    }

    #[test]
    fn scalars_keep_their_kind() {
        assert_eq!(
            normalize_value(&any(AnyValueKind::BoolValue(true))),
            Some(Value::Bool(true))
        );
        assert_eq!(
            normalize_value(&any(AnyValueKind::IntValue(42))),
            Some(Value::Int(42))
        );
        assert_eq!(
            normalize_value(&any(AnyValueKind::DoubleValue(1.5))),
            Some(Value::Float(1.5))
        );
        assert_eq!(
            normalize_value(&any(AnyValueKind::StringValue("GET".to_string()))),
            Some(Value::from("GET"))
        );
        assert_eq!(
            normalize_value(&any(AnyValueKind::BytesValue(vec![0xde, 0xad]))),
            Some(Value::Bytes(vec![0xde, 0xad]))
        );
    }

    #[test]
    fn empty_value_is_skipped() {
        assert_eq!(normalize_value(&AnyValue { value: None }), None);
    }

    #[test]
    fn arrays_are_converted_recursively() {
        let value = any(AnyValueKind::ArrayValue(ArrayValue {
            values: vec![
                any(AnyValueKind::IntValue(1)),
                AnyValue { value: None },
                any(AnyValueKind::ArrayValue(ArrayValue {
                    values: vec![any(AnyValueKind::StringValue("a".to_string()))],
                })),
            ],
        }));

        assert_eq!(
            normalize_value(&value),
            Some(Value::List(vec![
                Value::Int(1),
                Value::Null,
                Value::List(vec![Value::from("a")]),
            ]))
        );
    }

    #[test]
    fn empty_elements_keep_their_position() {
        let value = any(AnyValueKind::ArrayValue(ArrayValue {
            values: vec![
                any(AnyValueKind::IntValue(1)),
                AnyValue { value: None },
                any(AnyValueKind::IntValue(3)),
            ],
        }));

        let Some(Value::List(items)) = normalize_value(&value) else {
            panic!("expected a list");
        };
        assert_eq!(items.len(), 3);
        assert_eq!(items[1], Value::Null);
        assert_eq!(items[2], Value::Int(3));
    }

    #[test]
    fn kvlists_become_key_ordered_maps() {
        let value = any(AnyValueKind::KvlistValue(KeyValueList {
            values: vec![
                KeyValue {
                    key: "zone".to_string(),
                    value: Some(any(AnyValueKind::StringValue("eu-west-1a".to_string()))),
                },
                KeyValue {
                    key: "attempt".to_string(),
                    value: Some(any(AnyValueKind::IntValue(2))),
                },
                KeyValue {
                    key: "missing".to_string(),
                    value: None,
                },
            ],
        }));

        let Some(Value::Map(map)) = normalize_value(&value) else {
            panic!("expected a map");
        };
        assert_eq!(
            map.keys().collect::<Vec<_>>(),
            vec!["attempt", "missing", "zone"]
        );
        assert_eq!(map.get("attempt"), Some(&Value::Int(2)));
        assert_eq!(map.get("missing"), Some(&Value::Null));
    }

    #[test]
    fn sanitize_replaces_dots() {
        assert_eq!(sanitize_field_name("service.name"), "service_name");
        assert_eq!(sanitize_field_name("http.request.method"), "http_request_method");
        assert!(matches!(sanitize_field_name("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn sanitize_is_idempotent() {
        for key in ["service.name", "a..b", ".leading", "already_clean"] {
            let once = sanitize_field_name(key).into_owned();
            assert_eq!(sanitize_field_name(&once), once.as_str());
        }
    }
}
