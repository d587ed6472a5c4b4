//! Session store
//!
//! Holds who is signed in and their profile. It is driven by the backend's
//! auth-state channel: every change refetches the profile and tells the
//! caller which root screen to show.

use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;

use crate::data::{AuthUser, User, UserUpdate};
use crate::service::UserService;

/// Root screen for the current auth state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Welcome,
}

struct Inner {
    users: UserService,
    identity: watch::Sender<Option<AuthUser>>,
    profile: RwLock<Option<User>>,
}

/// Current identity and profile, shared by all screens
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(users: UserService) -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                users,
                identity,
                profile: RwLock::new(None),
            }),
        }
    }

    pub fn auth_user(&self) -> Option<AuthUser> {
        self.inner.identity.borrow().clone()
    }

    /// Id of the signed-in user
    pub fn user_id(&self) -> Option<String> {
        self.inner
            .identity
            .borrow()
            .as_ref()
            .map(|user| user.id.clone())
    }

    /// Profile of the signed-in user, with e-mail merged in
    pub fn user(&self) -> Option<User> {
        match self.inner.profile.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Identity changes as seen by this store
    pub fn watch(&self) -> watch::Receiver<Option<AuthUser>> {
        self.inner.identity.subscribe()
    }

    pub fn set_auth(&self, user: Option<AuthUser>) {
        self.inner.identity.send_replace(user);
    }

    pub fn set_user_data(&self, user: Option<User>) {
        match self.inner.profile.write() {
            Ok(mut guard) => *guard = user,
            Err(poisoned) => *poisoned.into_inner() = user,
        }
    }

    /// Merge a saved profile edit into the stored user
    pub fn merge_user_data(&self, update: &UserUpdate) {
        let mut guard = match self.inner.profile.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(user) = guard.as_mut() {
            user.apply(update);
        }
    }

    /// React to a sign-in or sign-out
    ///
    /// On sign-in the profile row is fetched and the session e-mail merged
    /// into it. A failed fetch leaves the profile empty but still routes
    /// home.
    pub async fn apply_auth_change(&self, user: Option<AuthUser>) -> Route {
        let Some(auth_user) = user else {
            self.set_auth(None);
            self.set_user_data(None);
            tracing::info!("Signed out");
            return Route::Welcome;
        };

        self.set_auth(Some(auth_user.clone()));
        match self.inner.users.get_user_data(&auth_user.id).await {
            Ok(mut profile) => {
                profile.email = auth_user.email.clone();
                self.set_user_data(Some(profile));
            }
            Err(failure) => {
                tracing::warn!(user_id = %auth_user.id, reason = %failure, "Profile unavailable");
                self.set_user_data(None);
            }
        }
        tracing::info!(user_id = %auth_user.id, "Signed in");
        Route::Home
    }

    /// Follow `changes` until the sender goes away
    ///
    /// The current value is applied first, then every change.
    pub async fn run(
        &self,
        changes: watch::Receiver<Option<AuthUser>>,
        mut on_route: impl FnMut(Route),
    ) {
        let mut changes = WatchStream::new(changes);
        while let Some(user) = changes.next().await {
            let route = self.apply_auth_change(user).await;
            on_route(route);
        }
    }
}
