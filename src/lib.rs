//! prometheus alertmanager receiver that forwards alerts to telegram and gotify
//!
//! Features:
//! - one webhook endpoint, every configured channel gets every batch
//! - per channel jinja2 templates with a shorter fallback for size limited channels
//! - label based exclusion rules
//! - a single retry for telegram on transient failures

pub mod alert;
pub mod alert_renderer;
pub mod alertmanager_webhook_receiver;
pub mod channels;
pub mod dispatcher;
pub mod exclusion;
pub mod log;
pub mod metrics;
pub mod rendered_alert;
pub mod settings;
pub mod telemetry_endpoint;
