use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{Appointment, AppointmentStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Requested,
    Created,
    Approved,
    Rejected,
    Cancelled,
    Rescheduled,
}

/// Summary handed to the notification sender after a lifecycle change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentNotice {
    pub kind: NoticeKind,
    pub appointment_id: String,
    pub display_id: Option<String>,
    pub status: AppointmentStatus,
    pub patient_id: String,
    pub patient_name: String,
    pub patient_email: Option<String>,
    pub doctor_id: String,
    pub doctor_name: String,
    pub date: NaiveDate,
    pub time: String,
    /// Rejection or cancellation reason when there is one.
    pub reason: Option<String>,
}

impl AppointmentNotice {
    pub fn new(kind: NoticeKind, appointment: &Appointment) -> Self {
        let reason = match kind {
            NoticeKind::Rejected => appointment.rejection_reason.clone(),
            NoticeKind::Cancelled => appointment.cancellation_reason.clone(),
            _ => None,
        };

        Self {
            kind,
            appointment_id: appointment.id.clone(),
            display_id: appointment.appointment_id.clone(),
            status: appointment.status,
            patient_id: appointment.patient_id.clone(),
            patient_name: appointment.patient_name.clone(),
            patient_email: appointment.patient_email.clone(),
            doctor_id: appointment.doctor_id.clone(),
            doctor_name: appointment.doctor_name.clone(),
            date: appointment.date,
            time: appointment.time.clone(),
            reason,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Notification endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notice: &AppointmentNotice) -> Result<(), NotificationError>;
}

/// Logs notices without delivering them anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSender for TracingNotifier {
    async fn send(&self, notice: &AppointmentNotice) -> Result<(), NotificationError> {
        info!(
            "Appointment {} {:?} for patient {} with doctor {} on {} {}",
            notice.appointment_id,
            notice.kind,
            notice.patient_id,
            notice.doctor_id,
            notice.date,
            notice.time
        );
        Ok(())
    }
}

/// Posts each notice as JSON to an external mailer endpoint.
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
impl NotificationSender for WebhookNotifier {
    async fn send(&self, notice: &AppointmentNotice) -> Result<(), NotificationError> {
        debug!("Posting {:?} notice for {} to {}", notice.kind, notice.appointment_id, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(notice)
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Delivers `notice`, logging instead of propagating any failure.
pub async fn notify(sender: &dyn NotificationSender, notice: AppointmentNotice) {
    if let Err(e) = sender.send(&notice).await {
        warn!(
            "Failed to send {:?} notice for appointment {}: {}",
            notice.kind, notice.appointment_id, e
        );
    }
}
