//! Profile editor screen

use super::Liveness;
use crate::auth::SessionStore;
use crate::data::{User, UserUpdate};
use crate::error::{Failure, Outcome};
use crate::service::{UserService, messages};
use crate::storage::{ImageSource, LocalMedia, MediaFolder, MediaKind, MediaRef, MediaStorage};

/// Editable profile fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileForm {
    pub name: String,
    pub phone_number: String,
    pub image: Option<MediaRef>,
    pub bio: String,
    pub address: String,
}

impl ProfileForm {
    pub fn from_user(user: &User) -> Self {
        Self {
            name: user.name.clone().unwrap_or_default(),
            phone_number: user.phone_number.clone().unwrap_or_default(),
            image: user
                .image
                .clone()
                .filter(|path| !path.is_empty())
                .map(MediaRef::remote),
            bio: user.bio.clone().unwrap_or_default(),
            address: user.address.clone().unwrap_or_default(),
        }
    }

    /// Every field filled in, image included
    pub fn is_complete(&self) -> bool {
        [&self.name, &self.phone_number, &self.bio, &self.address]
            .iter()
            .all(|field| !field.trim().is_empty())
            && self.image.is_some()
    }
}

/// State behind the edit-profile screen
pub struct ProfileEditor {
    users: UserService,
    media: MediaStorage,
    session: SessionStore,
    form: ProfileForm,
    liveness: Liveness,
}

impl ProfileEditor {
    /// Editor seeded from the signed-in user's profile
    pub fn new(
        users: UserService,
        media: MediaStorage,
        session: SessionStore,
        liveness: Liveness,
    ) -> Self {
        let form = session
            .user()
            .map(|user| ProfileForm::from_user(&user))
            .unwrap_or_default();
        Self {
            users,
            media,
            session,
            form,
            liveness,
        }
    }

    pub fn form(&self) -> &ProfileForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut ProfileForm {
        &mut self.form
    }

    pub fn pick_image(&mut self, uri: impl Into<String>) {
        self.form.image = Some(MediaRef::local(uri, MediaKind::Image));
    }

    /// Avatar preview: the picked file, the stored image, or the default
    pub fn display_image(&self) -> ImageSource {
        match &self.form.image {
            Some(MediaRef::Local(local)) => ImageSource::Local(local.uri.clone()),
            Some(MediaRef::Remote(remote)) => self.media.user_image_source(Some(&remote.path)),
            None => ImageSource::DefaultAvatar,
        }
    }

    /// Save the form
    ///
    /// A picked image is uploaded into `profiles/` first; if that upload
    /// fails the profile is saved without an image. On success the session
    /// profile is updated too.
    pub async fn submit(&mut self) -> Outcome<User> {
        if !self.form.is_complete() {
            return Err(Failure::new(messages::FILL_ALL_PROFILE_FIELDS));
        }
        let Some(user_id) = self.session.user_id() else {
            return Err(Failure::new(messages::PROFILE_NOT_UPDATED));
        };

        let image = match &self.form.image {
            Some(MediaRef::Local(local)) => self.upload_image(local).await,
            Some(MediaRef::Remote(remote)) => Some(remote.path.clone()),
            None => None,
        };

        let update = UserUpdate {
            name: self.form.name.trim().to_string(),
            phone_number: self.form.phone_number.trim().to_string(),
            image,
            bio: self.form.bio.trim().to_string(),
            address: self.form.address.trim().to_string(),
        };
        if let Err(failure) = self.users.update_user(&user_id, update.clone()).await {
            tracing::warn!(%user_id, reason = %failure, "Profile not updated");
            return Err(Failure::new(messages::PROFILE_NOT_UPDATED));
        }

        self.session.merge_user_data(&update);
        if self.liveness.is_alive() {
            self.form.image = update.image.clone().map(MediaRef::remote);
        }

        let mut user = self.session.user().unwrap_or_else(|| User {
            id: user_id,
            ..Default::default()
        });
        user.apply(&update);
        Ok(user)
    }

    async fn upload_image(&self, local: &LocalMedia) -> Option<String> {
        match self.media.upload_file(MediaFolder::Profiles, local).await {
            Ok(path) => Some(path),
            Err(failure) => {
                tracing::warn!(reason = %failure, "Avatar upload failed; saving without image");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data::AuthUser;
    use crate::error::AppError;
    use crate::platform::{Backend, MockBackend};

    fn editor(backend: MockBackend, signed_in: bool) -> (ProfileEditor, SessionStore) {
        let backend: Arc<dyn Backend> = Arc::new(backend);
        let config = crate::config::tests::valid_config();
        let media = MediaStorage::new(backend.clone(), reqwest::Client::new(), &config);
        let users = UserService::new(backend);
        let session = SessionStore::new(users.clone());
        if signed_in {
            session.set_auth(Some(AuthUser {
                id: "u-1".to_string(),
                email: Some("ada@example.com".to_string()),
            }));
            session.set_user_data(Some(User {
                id: "u-1".to_string(),
                name: Some("Ada".to_string()),
                phone_number: Some("555".to_string()),
                address: Some("London".to_string()),
                bio: Some("Engines".to_string()),
                image: Some("profiles/1.png".to_string()),
                email: Some("ada@example.com".to_string()),
            }));
        }
        let editor = ProfileEditor::new(users, media, session.clone(), Liveness::detached());
        (editor, session)
    }

    #[test]
    fn form_is_seeded_from_session() {
        let (editor, _) = editor(MockBackend::new(), true);
        assert_eq!(editor.form().name, "Ada");
        assert!(editor.form().is_complete());
        assert!(matches!(editor.display_image(), ImageSource::Remote(url) if url.ends_with("/uploads/profiles/1.png")));
    }

    #[tokio::test]
    async fn incomplete_form_is_rejected() {
        let (mut editor, _) = editor(MockBackend::new(), true);
        editor.form_mut().bio = " ".to_string();
        let failure = editor.submit().await.unwrap_err();
        assert_eq!(failure.msg, "Please fill all the fields!");
    }

    #[tokio::test]
    async fn failed_avatar_upload_saves_without_image() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("me.png");
        std::fs::write(&file, b"png").unwrap();

        let mut backend = MockBackend::new();
        backend
            .expect_upload_object()
            .returning(|_| Err(AppError::Storage("too large".to_string())));
        backend
            .expect_update_user()
            .withf(|id, update| id == "u-1" && update.image.is_none())
            .times(1)
            .returning(|_, _| Ok(()));
        let (mut editor, session) = editor(backend, true);
        editor.pick_image(file.to_string_lossy());

        let user = editor.submit().await.unwrap();
        assert!(user.image.is_none());
        assert_eq!(user.email.as_deref(), Some("ada@example.com"));
        assert!(session.user().unwrap().image.is_none());
    }

    #[tokio::test]
    async fn rejected_update_has_static_message() {
        let mut backend = MockBackend::new();
        backend
            .expect_update_user()
            .returning(|_, _| Err(AppError::Backend("permission denied".to_string())));
        let (mut editor, session) = editor(backend, true);
        editor.form_mut().name = "Ada L".to_string();

        let failure = editor.submit().await.unwrap_err();
        assert_eq!(failure.msg, "There was an error updating your profile!");
        assert_eq!(session.user().unwrap().name.as_deref(), Some("Ada"));
    }
}
