// Argus Host Monitoring Service - Notification Templates
// Severity/state keyed subject and body templates with field substitution

use super::NotifyError;
use crate::alerts::{AlertEvent, AlertState, Severity};
use crate::pool::StringPool;
use lazy_static::lazy_static;
use std::collections::HashMap;

/// Timestamp format used in rendered bodies.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One notification template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub subject: String,
    pub body: String,
}

impl Template {
    pub fn new(subject: &str, body: &str) -> Self {
        Self {
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }
}

lazy_static! {
    /// Built-in templates for every (severity, relevant state) pair.
    static ref BUILTIN: HashMap<(Severity, AlertState), Template> = {
        let mut map = HashMap::new();
        for severity in [Severity::Info, Severity::Warning, Severity::Critical] {
            map.insert(
                (severity, AlertState::Active),
                Template::new(
                    "[{severity}] {alert_name} triggered",
                    "Alert {alert_name} is active.\n\
                     Metric: {metric}\n\
                     Current value: {current_value} (threshold {operator} {threshold_value})\n\
                     Time: {timestamp}\n\
                     {message}",
                ),
            );
            map.insert(
                (severity, AlertState::Inactive),
                Template::new(
                    "[{severity}] {alert_name} resolved",
                    "Alert {alert_name} has resolved.\n\
                     Metric: {metric}\n\
                     Current value: {current_value} (threshold {operator} {threshold_value})\n\
                     Time: {timestamp}\n\
                     {message}",
                ),
            );
        }
        map
    };
}

/// Two-level template lookup keyed by `(severity, relevant state)`.
///
/// Templates are plain data; substitution replaces `{field}` placeholders
/// and leaves unknown placeholders untouched.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<(Severity, AlertState), Template>,
}

impl TemplateRegistry {
    /// Empty registry; every render fails until templates are inserted.
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in template set.
    pub fn builtin() -> Self {
        Self {
            templates: BUILTIN.clone(),
        }
    }

    /// Insert or replace a template.
    pub fn insert(&mut self, severity: Severity, state: AlertState, template: Template) {
        self.templates.insert((severity, state), template);
    }

    /// Render subject and body for an event into pooled string builders.
    ///
    /// The caller owns the returned strings and should release them back to
    /// the pool once every channel has been dispatched.
    pub fn render(
        &self,
        event: &AlertEvent,
        strings: &StringPool,
    ) -> Result<(String, String), NotifyError> {
        let template = self
            .templates
            .get(&(event.config.severity, event.new_state))
            .ok_or(NotifyError::TemplateMissing {
                severity: event.config.severity,
                state: event.new_state,
            })?;

        let vars = substitution_vars(event);

        let mut subject = strings.acquire();
        substitute(&template.subject, &vars, &mut subject);

        let mut body = strings.acquire();
        substitute(&template.body, &vars, &mut body);

        Ok((subject, body))
    }
}

fn substitution_vars(event: &AlertEvent) -> HashMap<&'static str, String> {
    let mut vars = HashMap::new();
    vars.insert("alert_id", event.alert_id.clone());
    vars.insert("alert_name", event.config.name.clone());
    vars.insert("description", event.config.description.clone());
    vars.insert("severity", event.config.severity.to_string());
    vars.insert("state", event.new_state.to_string());
    vars.insert("metric", event.threshold.metric.to_string());
    vars.insert("operator", event.threshold.operator.to_string());
    vars.insert("current_value", format!("{:.2}", event.current_value));
    vars.insert("threshold_value", format!("{:.2}", event.threshold.value));
    vars.insert(
        "timestamp",
        event.timestamp.format(TIMESTAMP_FORMAT).to_string(),
    );
    vars.insert("message", event.message.clone());
    vars
}

/// Replace `{name}` placeholders from `vars`; unknown placeholders and
/// unterminated braces are copied through verbatim.
fn substitute(template: &str, vars: &HashMap<&'static str, String>, out: &mut String) {
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                return;
            }
        }
    }
    out.push_str(rest);
}
