//! Tracing setup.
//!
//! One-shot commands log to stderr. The TUI owns the terminal, so there every
//! event is formatted into a line and sent to the in-app log pane instead.

use crossbeam_channel::Sender;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,podcast_cli=info,podcast_player=info"))
}

pub fn init_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Route every event to `tx` as a single formatted line.
pub fn init_channel(tx: Sender<String>) {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(ChannelLayer::new(tx))
        .init();
}

pub struct ChannelLayer {
    tx: Sender<String>,
}

impl ChannelLayer {
    pub fn new(tx: Sender<String>) -> Self {
        Self { tx }
    }
}

impl<S> Layer<S> for ChannelLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let meta = event.metadata();
        let clock = OffsetDateTime::now_utc()
            .format(format_description!("[hour]:[minute]:[second]"))
            .unwrap_or_default();
        let line = format_line(&clock, &meta.level().to_string(), meta.target(), visitor);
        // Receiver gone means the UI has exited.
        let _ = self.tx.send(line);
    }
}

fn format_line(clock: &str, level: &str, target: &str, visitor: LineVisitor) -> String {
    let mut line = format!(
        "{clock} {level:>5} {target}: {}",
        visitor.message.unwrap_or_default()
    );
    for field in visitor.fields {
        line.push(' ');
        line.push_str(&field);
    }
    line
}

#[derive(Default)]
struct LineVisitor {
    message: Option<String>,
    fields: Vec<String>,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let formatted = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(formatted.trim_matches('"').to_string());
        } else {
            self.fields.push(format!("{}={}", field.name(), formatted));
        }
    }
}
