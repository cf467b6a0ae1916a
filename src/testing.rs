//! Test support: a subscriber that records event messages.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{Dispatch, Event, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, Layer, SubscriberExt};
use tracing_subscriber::Registry;
use tracing_subscriber::registry::LookupSpan;

/// One recorded event: its message and the name of its parent span.
type Record = (String, Option<String>);

#[derive(Clone, Default)]
pub(crate) struct Capture {
    records: Arc<Mutex<Vec<Record>>>,
}

impl Capture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn dispatch(&self) -> Dispatch {
        Dispatch::new(Registry::default().with(self.clone()))
    }

    /// Recorded messages, oldest first.
    pub(crate) fn lines(&self) -> Vec<String> {
        self.records.lock().unwrap().iter().map(|(line, _)| line.clone()).collect()
    }

    /// Recorded messages paired with the span each was emitted in.
    pub(crate) fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }
}

struct Message(Option<String>);

impl Visit for Message {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0 = Some(value.to_owned());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S> Layer<S> for Capture
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: LayerContext<'_, S>) {
        let mut message = Message(None);
        event.record(&mut message);
        if let Some(line) = message.0 {
            let span = ctx.event_span(event).map(|span| span.name().to_owned());
            self.records.lock().unwrap().push((line, span));
        }
    }
}
