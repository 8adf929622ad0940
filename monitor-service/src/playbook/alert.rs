//! Alert delivery.

use common::models::playbook::Alert;
use tokio::sync::mpsc;

/// Consumer of alerts raised by the playbook engine.
pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: &Alert);
}

/// Writes alerts to the log.
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn emit(&self, alert: &Alert) {
        tracing::warn!(
            alert_id = %alert.id,
            playbook = %alert.playbook,
            db = %alert.database.name,
            metric = %alert.trigger.metric,
            operator = %alert.trigger.operator,
            threshold = alert.trigger.threshold,
            value = alert.measured_value,
            action = %alert.trigger.action,
            "Trigger condition met"
        );
    }
}

/// Forwards alerts to an in-process consumer.
pub struct ChannelAlertSink {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelAlertSink {
    /// Creates a sink together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelAlertSink {
    fn emit(&self, alert: &Alert) {
        if self.tx.send(alert.clone()).is_err() {
            tracing::debug!(alert_id = %alert.id, "Alert receiver dropped");
        }
    }
}
