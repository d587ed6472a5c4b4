//! Notification service

use std::sync::Arc;

use super::messages;
use crate::data::{NewNotification, Notification};
use crate::error::{Failure, Outcome};
use crate::platform::Backend;

/// Notification service
#[derive(Clone)]
pub struct NotificationService {
    backend: Arc<dyn Backend>,
}

impl NotificationService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn create_notification(&self, notification: NewNotification) -> Outcome<Notification> {
        self.backend
            .insert_notification(notification)
            .await
            .map_err(|e| {
                Failure::from_error("create_notification", messages::SEND_NOTIFICATION, e)
            })
    }

    /// Notifications addressed to `receiver_id`, newest first
    pub async fn fetch_notifications(&self, receiver_id: &str) -> Outcome<Vec<Notification>> {
        self.backend
            .fetch_notifications(receiver_id.to_string())
            .await
            .map_err(|e| {
                Failure::from_error("fetch_notifications", messages::FETCH_NOTIFICATIONS, e)
            })
    }
}
