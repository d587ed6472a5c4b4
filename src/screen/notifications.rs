//! Notifications screen

use super::Liveness;
use crate::data::{Notification, NotificationTarget};
use crate::error::Outcome;
use crate::service::NotificationService;

/// Notifications for the signed-in user, newest first
pub struct NotificationsScreen {
    service: NotificationService,
    items: Vec<Notification>,
    loaded: bool,
    liveness: Liveness,
}

impl NotificationsScreen {
    pub fn new(service: NotificationService, liveness: Liveness) -> Self {
        Self {
            service,
            items: Vec::new(),
            loaded: false,
            liveness,
        }
    }

    pub async fn load(&mut self, receiver_id: &str) -> Outcome<()> {
        let items = self.service.fetch_notifications(receiver_id).await?;
        if self.liveness.is_alive() {
            self.items = items;
            self.loaded = true;
        }
        Ok(())
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    /// Loaded and nothing to show
    pub fn is_empty(&self) -> bool {
        self.loaded && self.items.is_empty()
    }

    /// Each notification with the post/comment it opens
    pub fn entries(&self) -> impl Iterator<Item = (&Notification, Option<NotificationTarget>)> {
        self.items.iter().map(|item| (item, item.target()))
    }
}
