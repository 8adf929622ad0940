//! Playbook-driven alerting.
//!
//! Playbooks are loaded once at startup; the engine re-reads the registered
//! databases before every cycle, measures each trigger's metric through a
//! [`MetricToolRegistry`] and hands matching alerts to an [`AlertSink`].

pub mod alert;
pub mod engine;
pub mod loader;
pub mod tools;

pub use alert::{AlertSink, ChannelAlertSink, LogAlertSink};
pub use engine::{condition_met, PlaybookEngine};
pub use loader::{load_playbooks, parse_playbooks, read_playbooks};
pub use tools::{MetricTool, MetricToolRegistry};
