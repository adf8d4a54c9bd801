//! One JSON object per event.

use std::fmt::Write;

use serde_json::{json, Map, Value};
use tracing::{Event, Subscriber};
use tracing_core::field::Field;
use tracing_serde::AsSerde;
use tracing_subscriber::{
    field::Visit,
    fmt::{format::Writer, FmtContext, FormatFields, FormattedFields},
    registry::LookupSpan,
};

#[derive(Default)]
struct EventFieldVisitor {
    json: Map<String, Value>,
}

impl Visit for EventFieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.json
            .insert(field.name().into(), json!(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.json.insert(field.name().into(), json!(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.json.insert(field.name().into(), json!(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.json.insert(field.name().into(), json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.json.insert(field.name().into(), json!(value));
    }
}

/// Formatting the events for json
///
/// Spans are listed root first, each with the fields it was recorded with,
/// so a neutralized statement can be traced back to its request.
pub(crate) struct FormatEvent;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for FormatEvent
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::offset::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        let mut spans = vec![];
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let ext = span.extensions();
                let fields = ext
                    .get::<FormattedFields<N>>()
                    .map(|f| f.fields.as_str())
                    .unwrap_or_default();
                spans.push(json!({
                    "name": span.name(),
                    "target": span.metadata().target(),
                    "fields": fields,
                }));
            }
        }

        let meta = event.metadata();
        let mut values = EventFieldVisitor::default();
        event.record(&mut values);
        let json = json!({
            "time": now,
            "level": meta.level().as_serde(),
            "target": meta.target(),
            "file": meta.file(),
            "line": meta.line(),
            "fields": values.json,
            "spans": spans,
        });
        writeln!(writer, "{}", json)
    }
}
