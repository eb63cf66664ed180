//! Channel notifier implementations.

mod email;
mod pagerduty;
mod slack;
mod sms;
mod teams;
mod webhook;

use std::sync::Arc;

use vigil_core::config::ChannelsConfig;
use vigil_core::notification::Channel;

pub use email::EmailNotifier;
pub use pagerduty::PagerdutyNotifier;
pub use slack::SlackNotifier;
pub use sms::SmsNotifier;
pub use teams::TeamsNotifier;
pub use webhook::WebhookNotifier;

use crate::traits::{Notifier, NotifyError};

/// Build the notifier for a channel from configuration.
pub fn build_notifier(
    channel: Channel,
    config: &ChannelsConfig,
) -> Result<Arc<dyn Notifier>, NotifyError> {
    let timeout = config.for_channel(channel).timeout();
    Ok(match channel {
        Channel::Email => Arc::new(EmailNotifier::from_config(
            &config.smtp_host,
            config.smtp_port,
            config.smtp_username.as_deref(),
            config.smtp_password.as_deref(),
            &config.smtp_from,
        )?),
        Channel::Slack => Arc::new(SlackNotifier::new(
            config
                .slack_webhook_url
                .clone()
                .ok_or_else(|| NotifyError::Config("SLACK_WEBHOOK_URL not set".to_string()))?,
            timeout,
        )?),
        Channel::Teams => Arc::new(TeamsNotifier::new(
            config
                .teams_webhook_url
                .clone()
                .ok_or_else(|| NotifyError::Config("TEAMS_WEBHOOK_URL not set".to_string()))?,
            timeout,
        )?),
        Channel::Webhook => Arc::new(WebhookNotifier::new(timeout)?),
        Channel::Sms => Arc::new(SmsNotifier::new(
            config
                .sms_gateway_url
                .clone()
                .ok_or_else(|| NotifyError::Config("SMS_GATEWAY_URL not set".to_string()))?,
            timeout,
        )?),
        Channel::Pagerduty => Arc::new(PagerdutyNotifier::new(
            config
                .pagerduty_routing_key
                .clone()
                .ok_or_else(|| NotifyError::Config("PAGERDUTY_ROUTING_KEY not set".to_string()))?,
            timeout,
        )?),
    })
}
