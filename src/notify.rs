use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    lifecycle::{RequestStatus, Role, Transition},
};

/// Payload of a `notify-participants` job, written alongside every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionNotice {
    pub request_id: Uuid,
    pub transition: Transition,
    pub from: Option<RequestStatus>,
    pub to: RequestStatus,
    pub actor_user_id: Uuid,
}

impl TransitionNotice {
    /// Roles that hear about this transition.
    pub fn audience(&self) -> &'static [Role] {
        match self.transition {
            Transition::Create => &[Role::Admin],
            Transition::SetValue => &[Role::Company],
            Transition::Assign => &[Role::Correspondent, Role::Company],
            Transition::Accept => &[Role::Admin, Role::Company],
            Transition::Reject => &[Role::Admin],
            Transition::ConfirmPresence => &[Role::Company],
            Transition::SubmitDocumentation => &[Role::Admin, Role::Company],
            Transition::Cancel => &[Role::Admin],
        }
    }

    pub fn subject(&self) -> String {
        let short_id = &self.request_id.simple().to_string()[..8];
        let headline = match self.transition {
            Transition::Create => "New service request awaiting approval",
            Transition::SetValue => "Service request approved",
            Transition::Assign => "Correspondent assigned",
            Transition::Accept => "Assignment accepted",
            Transition::Reject => "Assignment rejected",
            Transition::ConfirmPresence => "Correspondent presence confirmed",
            Transition::SubmitDocumentation => "Service completed",
            Transition::Cancel => "Service request cancelled",
        };
        format!("{headline} (#{short_id})")
    }

    pub fn message(&self, recipient_role: Role) -> String {
        let from = self
            .from
            .map(|status| status.to_string())
            .unwrap_or_else(|| "new".to_string());
        let hint = match (self.transition, recipient_role) {
            (Transition::Assign, Role::Correspondent) => {
                " Please accept or reject the assignment."
            }
            (Transition::Reject, Role::Admin) => " The request needs a new correspondent.",
            (Transition::SubmitDocumentation, _) => " Documentation is available.",
            _ => "",
        };
        format!(
            "Service request {} moved from {from} to {}.{hint}",
            self.request_id, self.to
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub request_id: Uuid,
    pub recipient_email: String,
    pub recipient_name: String,
    pub recipient_role: Role,
    pub subject: String,
    pub message: String,
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log; used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            request_id = %notification.request_id,
            recipient = %notification.recipient_email,
            role = %notification.recipient_role,
            subject = %notification.subject,
            "notification"
        );
        Ok(())
    }
}

/// Posts each notification as JSON to an external delivery service.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        self.client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .context("failed to reach notification webhook")?
            .error_for_status()
            .context("notification webhook rejected the notification")?;
        Ok(())
    }
}

pub fn notifier_from_config(config: &AppConfig) -> Arc<dyn Notifier> {
    match &config.notification_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    }
}
