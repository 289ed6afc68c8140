#![allow(dead_code)]
//! Thread-scoped capture of `tracing` events for assertions.

use std::sync::{Arc, Mutex};

use tracing::Level;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};

/// One captured event.
#[derive(Debug, Clone)]
pub struct CapturedLog {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl CapturedLog {
    /// Message and every field value, for substring searches.
    fn text(&self) -> String {
        let mut text = self.message.clone();
        for (name, value) in &self.fields {
            text.push(' ');
            text.push_str(name);
            text.push('=');
            text.push_str(value);
        }
        text
    }
}

/// Captures events emitted on the current thread until dropped.
pub struct TestLogCapture {
    logs: Arc<Mutex<Vec<CapturedLog>>>,
    _guard: tracing::subscriber::DefaultGuard,
}

impl TestLogCapture {
    pub fn start() -> Self {
        let logs = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(CaptureLayer {
            logs: Arc::clone(&logs),
        });
        Self {
            logs,
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }

    pub fn logs(&self) -> Vec<CapturedLog> {
        self.logs.lock().unwrap().clone()
    }

    fn messages(&self) -> Vec<String> {
        self.logs().into_iter().map(|l| l.message).collect()
    }

    pub fn assert_logged(&self, needle: &str) {
        assert!(
            self.logs().iter().any(|l| l.message.contains(needle)),
            "Expected log containing '{needle}'. Logged: {:#?}",
            self.messages()
        );
    }

    pub fn assert_logged_at_level(&self, level: Level, needle: &str) {
        assert!(
            self.logs()
                .iter()
                .any(|l| l.level == level && l.message.contains(needle)),
            "Expected {level} log containing '{needle}'. Logged: {:#?}",
            self.messages()
        );
    }

    pub fn assert_field_logged(&self, field_name: &str, field_value: &str) {
        let logs = self.logs();
        let found = logs.iter().any(|l| {
            l.fields
                .iter()
                .any(|(k, v)| k == field_name && v.contains(field_value))
        });
        assert!(
            found,
            "Expected field {field_name}={field_value}. Logged fields: {:#?}",
            logs.iter().map(|l| &l.fields).collect::<Vec<_>>()
        );
    }

    /// Fail if `needle` appears in any message or field value.
    pub fn assert_never_logged(&self, needle: &str) {
        let leaked: Vec<_> = self
            .logs()
            .iter()
            .map(CapturedLog::text)
            .filter(|t| t.contains(needle))
            .collect();
        assert!(leaked.is_empty(), "'{needle}' leaked into logs: {leaked:#?}");
    }

    pub fn assert_no_errors(&self) {
        let errors: Vec<_> = self
            .logs()
            .into_iter()
            .filter(|l| l.level == Level::ERROR)
            .collect();
        assert!(errors.is_empty(), "Unexpected errors: {errors:#?}");
    }
}

struct CaptureLayer {
    logs: Arc<Mutex<Vec<CapturedLog>>>,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.logs.lock().unwrap().push(CapturedLog {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }
}
