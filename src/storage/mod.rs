//! Media storage
//!
//! Handles:
//! - Local vs stored media references
//! - Public URL resolution for display
//! - Uploads into the `uploads` bucket and downloads for sharing

mod media;

pub use media::{
    ImageSource, LocalMedia, MediaFolder, MediaKind, MediaRef, MediaStorage, RemoteMedia,
    public_url, upload_path,
};
