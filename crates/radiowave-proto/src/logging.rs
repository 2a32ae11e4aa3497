//! Tracing setup for hosts embedding the library.
//!
//! Logs go to `<data_dir>/radiowave.log`. Optionally WARN and ERROR lines are
//! also pushed onto a broadcast channel so the UI can show them.

use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "info,radiowave=debug,hyper_util=warn,reqwest=warn,hyper=warn";

/// Forwards WARN / ERROR events to a broadcast channel.
pub struct ForwardLayer {
    sender: broadcast::Sender<String>,
}

impl ForwardLayer {
    pub fn new(sender: broadcast::Sender<String>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for ForwardLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }
        let _ = self.sender.send(format_event(event));
    }
}

fn format_event(event: &tracing::Event<'_>) -> String {
    let mut message = format!(
        "{} [{}] ",
        chrono::Local::now().format("%H:%M:%S"),
        event.metadata().level()
    );
    let mut visitor = MessageVisitor(&mut message);
    event.record(&mut visitor);
    message
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

pub fn log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("radiowave.log")
}

/// Install the global subscriber. Returns the log file path.
///
/// `RUST_LOG` overrides the default filter.
pub fn init(data_dir: &Path, forward: Option<broadcast::Sender<String>>) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(data_dir)?;
    let path = log_path(data_dir);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(forward.map(ForwardLayer::new))
        .with(filter)
        .try_init()?;

    tracing::info!("radiowave logging to {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_forward_layer_only_warn_and_error() {
        let (tx, mut rx) = broadcast::channel(8);
        let subscriber = tracing_subscriber::registry().with(ForwardLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("not forwarded");
            tracing::warn!(mirror = "de1", "mirror failed");
            tracing::error!("stream died");
        });

        let first = rx.try_recv().unwrap();
        assert!(first.contains("[WARN]"));
        assert!(first.contains("mirror failed"));
        assert!(first.contains("mirror=\"de1\""));
        let second = rx.try_recv().unwrap();
        assert!(second.contains("[ERROR]"));
        assert!(rx.try_recv().is_err());
    }
}
