//! Minijinja rendering of notification subjects and bodies.
//!
//! Templates are arbitrary strings supplied per rule action, so a fresh
//! environment is built per render call; defaults cover the common case
//! of rules with no template.

use serde::Serialize;

use vigil_core::alert::Alert;
use vigil_core::rule::Severity;

use crate::traits::NotifyError;

/// Default subject when the action supplies none.
const DEFAULT_SUBJECT: &str = "[{{ alert.severity | upper }}] {{ alert.title }}";

/// Default plain-text body.
const DEFAULT_BODY: &str = "\
Alert: {{ alert.title }}
Severity: {{ alert.severity }}
Status: {{ alert.status }}
Source: {{ alert.source }}
{% if alert.description %}{{ alert.description }}
{% endif %}\
{% if entities %}Entities: {{ entities | join(\", \") }}
{% endif %}\
Occurred: {{ occurred_at }}";

/// Context handed to every template.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationContext {
    pub alert: AlertContext,
    pub rule_name: Option<String>,
    pub entities: Vec<String>,
    pub occurred_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertContext {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub severity: String,
    pub status: String,
    pub source: String,
    pub kind: String,
    pub escalation_level: i32,
}

impl NotificationContext {
    pub fn from_alert(alert: &Alert, rule_name: Option<String>) -> Self {
        Self {
            alert: AlertContext {
                id: alert.id.to_string(),
                title: alert.title.clone(),
                description: alert.description.clone(),
                severity: alert.severity.to_string(),
                status: alert.status.to_string(),
                source: alert.source.clone(),
                kind: alert.kind.clone(),
                escalation_level: alert.escalation_level,
            },
            rule_name,
            entities: alert.entity_ids.clone(),
            occurred_at: alert.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("severity_emoji", severity_emoji_filter);
        env
    }

    /// Validate template syntax without rendering.
    pub fn validate(&self, template: &str) -> Result<(), NotifyError> {
        let mut env = Self::build_env();
        env.add_template("probe", template)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }

    pub fn render(
        &self,
        template: &str,
        context: &NotificationContext,
    ) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template, context)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Subject line: the action's template or the default.
    pub fn render_subject(
        &self,
        template: Option<&str>,
        context: &NotificationContext,
    ) -> Result<String, NotifyError> {
        self.render(template.unwrap_or(DEFAULT_SUBJECT), context)
    }

    /// Body: the action's template or the default plain-text layout.
    pub fn render_body(
        &self,
        template: Option<&str>,
        context: &NotificationContext,
    ) -> Result<String, NotifyError> {
        self.render(template.unwrap_or(DEFAULT_BODY), context)
    }
}

/// `{{ alert.severity | severity_emoji }}` for chat channels.
fn severity_emoji_filter(value: String) -> String {
    match value.parse::<Severity>() {
        Ok(Severity::Critical) => "🔴".to_string(),
        Ok(Severity::High) => "🟠".to_string(),
        Ok(Severity::Medium) => "🟡".to_string(),
        Ok(Severity::Low) => "🟢".to_string(),
        Err(_) => "⚪".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;
    use vigil_core::alert::AlertStatus;
    use vigil_core::rule::Priority;

    fn sample_alert() -> Alert {
        Alert {
            id: Uuid::new_v4(),
            rule_id: None,
            kind: "anomaly".to_string(),
            severity: Severity::Critical,
            priority: Priority::High,
            status: AlertStatus::Open,
            title: "Unusual wire volume".to_string(),
            description: Some("Volume 5x baseline".to_string()),
            source: "pattern-engine".to_string(),
            event_payload: serde_json::json!({}),
            entity_ids: vec!["acc-1".to_string(), "acc-2".to_string()],
            tags: Vec::new(),
            metadata: HashMap::new(),
            fingerprint: "fp".to_string(),
            correlation_id: None,
            parent_alert_id: None,
            escalation_level: 0,
            escalation_policy_id: None,
            assigned_to: None,
            notification_sent: false,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
            resolution_reason: None,
            escalated_at: None,
        }
    }

    #[test]
    fn default_subject_renders() {
        let renderer = TemplateRenderer::new();
        let context = NotificationContext::from_alert(&sample_alert(), None);
        let subject = renderer.render_subject(None, &context).unwrap();
        assert_eq!(subject, "[CRITICAL] Unusual wire volume");
    }

    #[test]
    fn default_body_includes_entities() {
        let renderer = TemplateRenderer::new();
        let context = NotificationContext::from_alert(&sample_alert(), None);
        let body = renderer.render_body(None, &context).unwrap();
        assert!(body.contains("Entities: acc-1, acc-2"));
        assert!(body.contains("Severity: critical"));
    }

    #[test]
    fn custom_template_wins() {
        let renderer = TemplateRenderer::new();
        let context = NotificationContext::from_alert(&sample_alert(), Some("r1".to_string()));
        let body = renderer
            .render_body(Some("{{ rule_name }}: {{ alert.title }}"), &context)
            .unwrap();
        assert_eq!(body, "r1: Unusual wire volume");
    }

    #[test]
    fn invalid_template_rejected_by_validate() {
        let renderer = TemplateRenderer::new();
        assert!(renderer.validate("{{ unclosed").is_err());
        assert!(renderer.validate("{{ ok }}").is_ok());
    }

    #[test]
    fn emoji_filter() {
        let renderer = TemplateRenderer::new();
        let context = NotificationContext::from_alert(&sample_alert(), None);
        let out = renderer
            .render("{{ alert.severity | severity_emoji }}", &context)
            .unwrap();
        assert_eq!(out, "🔴");
    }
}
