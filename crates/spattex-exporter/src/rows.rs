//! Flattening of OTLP trace requests into rows.

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::KeyValue;
use opentelemetry_proto::tonic::trace::v1::Span;
use spattex_store::{Row, Value};

use crate::config::{ExporterConfig, NAME_FIELD};
use crate::normalize::{normalize_value, sanitize_field_name};

/// Builds one [`Row`] per span.
///
/// Each row holds, in write order: the span name under `name`, the partition
/// timestamp when enabled, the resource attributes, then the span
/// attributes. A later write to the same sanitized field replaces the
/// earlier value, so span attributes win over resource attributes and any
/// attribute may overwrite a synthetic field.
#[derive(Debug, Clone, Default)]
pub struct RowBuilder {
    partition_field: Option<String>,
}

impl RowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the span start time, in microseconds since the epoch, to `field`.
    pub fn with_partition_timestamp(mut self, field: impl Into<String>) -> Self {
        self.partition_field = Some(field.into());
        self
    }

    pub fn from_config(config: &ExporterConfig) -> Self {
        let builder = Self::new();
        if config.write_partition_timestamp {
            builder.with_partition_timestamp(&config.partition_field)
        } else {
            builder
        }
    }

    /// Flatten every span of the request, in resource, scope, span order.
    pub fn build(&self, request: &ExportTraceServiceRequest) -> Vec<Row> {
        let mut rows = Vec::new();

        for resource_spans in &request.resource_spans {
            let resource_attrs = resource_spans
                .resource
                .as_ref()
                .map(|r| r.attributes.as_slice())
                .unwrap_or_default();

            for scope_spans in &resource_spans.scope_spans {
                for span in &scope_spans.spans {
                    rows.push(self.span_row(resource_attrs, span));
                }
            }
        }

        rows
    }

    fn span_row(&self, resource_attrs: &[KeyValue], span: &Span) -> Row {
        let mut row = Row::new();
        row.insert(NAME_FIELD, Value::String(span.name.clone()));

        if let Some(field) = &self.partition_field {
            row.insert(field.as_str(), Value::Int(start_time_micros(span)));
        }

        write_attributes(&mut row, resource_attrs);
        write_attributes(&mut row, &span.attributes);
        row
    }
}

fn write_attributes(row: &mut Row, attrs: &[KeyValue]) {
    for kv in attrs {
        if let Some(value) = kv.value.as_ref().and_then(normalize_value) {
            row.insert(sanitize_field_name(&kv.key), value);
        }
    }
}

#[allow(clippy::cast_possible_wrap, clippy::as_conversions)]
const fn start_time_micros(span: &Span) -> i64 {
    (span.start_time_unix_nano / 1_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::common::v1::{any_value::Value as AnyValueKind, AnyValue};
    use opentelemetry_proto::tonic::resource::v1::Resource;
    use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans};

    fn make_kv(key: &str, value: AnyValueKind) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: Some(AnyValue { value: Some(value) }),
        }
    }

    fn str_kv(key: &str, value: &str) -> KeyValue {
        make_kv(key, AnyValueKind::StringValue(value.to_string()))
    }

    fn span(name: &str, attributes: Vec<KeyValue>) -> Span {
        Span {
            name: name.to_string(),
            attributes,
            start_time_unix_nano: 1_700_000_000_123_456_789,
            ..Default::default()
        }
    }

    fn resource_spans(resource_attrs: Vec<KeyValue>, scopes: Vec<Vec<Span>>) -> ResourceSpans {
        ResourceSpans {
            resource: Some(Resource {
                attributes: resource_attrs,
                ..Default::default()
            }),
            scope_spans: scopes
                .into_iter()
                .map(|spans| ScopeSpans {
                    spans,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_request_builds_no_rows() {
        let rows = RowBuilder::new().build(&ExportTraceServiceRequest::default());
        assert!(rows.is_empty());

        let request = ExportTraceServiceRequest {
            resource_spans: vec![resource_spans(vec![str_kv("service.name", "svc")], vec![])],
        };
        assert!(RowBuilder::new().build(&request).is_empty());
    }

    #[test]
    fn one_row_per_span_in_traversal_order() {
        let request = ExportTraceServiceRequest {
            resource_spans: vec![
                resource_spans(
                    vec![str_kv("service.name", "svc1")],
                    vec![vec![span("a", vec![]), span("b", vec![])], vec![span("c", vec![])]],
                ),
                resource_spans(vec![str_kv("service.name", "svc2")], vec![vec![span("d", vec![])]]),
            ],
        };

        let rows = RowBuilder::new().build(&request);
        let names: Vec<_> = rows.iter().map(|r| r.get("name").cloned()).collect();
        assert_eq!(
            names,
            vec![
                Some(Value::from("a")),
                Some(Value::from("b")),
                Some(Value::from("c")),
                Some(Value::from("d")),
            ]
        );
    }

    #[test]
    fn resource_and_span_attributes_are_flattened() {
        let request = ExportTraceServiceRequest {
            resource_spans: vec![resource_spans(
                vec![str_kv("service.name", "svc1")],
                vec![vec![span(
                    "span1",
                    vec![
                        make_kv("int.key", AnyValueKind::IntValue(41)),
                        make_kv("ratio", AnyValueKind::DoubleValue(0.5)),
                        make_kv("cached", AnyValueKind::BoolValue(true)),
                        KeyValue {
                            key: "empty".to_string(),
                            value: Some(AnyValue { value: None }),
                        },
                    ],
                )]],
            )],
        };

        let rows = RowBuilder::new().build(&request);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(
            row.field_names().collect::<Vec<_>>(),
            vec!["name", "service_name", "int_key", "ratio", "cached"]
        );
        assert_eq!(row.get("service_name"), Some(&Value::from("svc1")));
        assert_eq!(row.get("int_key"), Some(&Value::Int(41)));
        assert!(!row.contains_field("empty"));
    }

    #[test]
    fn span_attributes_override_resource_attributes() {
        let request = ExportTraceServiceRequest {
            resource_spans: vec![resource_spans(
                vec![str_kv("deployment.env", "prod"), str_kv("region", "eu")],
                vec![vec![span("span1", vec![str_kv("deployment_env", "canary")])]],
            )],
        };

        let rows = RowBuilder::new().build(&request);
        let row = &rows[0];
        assert_eq!(row.get("deployment_env"), Some(&Value::from("canary")));
        assert_eq!(
            row.field_names().collect::<Vec<_>>(),
            vec!["name", "deployment_env", "region"]
        );
    }

    #[test]
    fn attributes_may_overwrite_the_name_field() {
        let request = ExportTraceServiceRequest {
            resource_spans: vec![resource_spans(
                vec![],
                vec![vec![span("span1", vec![str_kv("name", "renamed")])]],
            )],
        };

        let rows = RowBuilder::new().build(&request);
        assert_eq!(rows[0].get("name"), Some(&Value::from("renamed")));
    }

    #[test]
    fn resource_groups_do_not_leak_into_each_other() {
        let request = ExportTraceServiceRequest {
            resource_spans: vec![
                resource_spans(
                    vec![str_kv("service.name", "svc1"), str_kv("host.name", "h1")],
                    vec![vec![span("span1", vec![])]],
                ),
                resource_spans(
                    vec![str_kv("service.name", "svc2")],
                    vec![vec![span("span2", vec![])]],
                ),
            ],
        };

        let rows = RowBuilder::new().build(&request);
        assert_eq!(rows[0].get("host_name"), Some(&Value::from("h1")));
        assert_eq!(rows[1].get("service_name"), Some(&Value::from("svc2")));
        assert!(!rows[1].contains_field("host_name"));
    }

    #[test]
    fn missing_resource_yields_span_fields_only() {
        let request = ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                resource: None,
                scope_spans: vec![ScopeSpans {
                    spans: vec![span("span1", vec![str_kv("k", "v")])],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };

        let rows = RowBuilder::new().build(&request);
        assert_eq!(rows[0].field_names().collect::<Vec<_>>(), vec!["name", "k"]);
    }

    #[test]
    fn partition_timestamp_is_written_in_micros() {
        let request = ExportTraceServiceRequest {
            resource_spans: vec![resource_spans(vec![], vec![vec![span("span1", vec![])]])],
        };

        let rows = RowBuilder::new()
            .with_partition_timestamp("ts")
            .build(&request);
        assert_eq!(
            rows[0].field_names().collect::<Vec<_>>(),
            vec!["name", "ts"]
        );
        assert_eq!(rows[0].get("ts"), Some(&Value::Int(1_700_000_000_123_456)));
    }

    #[test]
    fn builder_from_config() {
        let mut config = ExporterConfig::default();
        let request = ExportTraceServiceRequest {
            resource_spans: vec![resource_spans(vec![], vec![vec![span("span1", vec![])]])],
        };

        assert!(!RowBuilder::from_config(&config).build(&request)[0].contains_field("ts"));

        config.write_partition_timestamp = true;
        config.partition_field = "day".to_string();
        assert!(RowBuilder::from_config(&config).build(&request)[0].contains_field("day"));
    }
}
