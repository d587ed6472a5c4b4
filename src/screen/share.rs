//! Share sheet content

use std::path::PathBuf;

use crate::data::Post;
use crate::storage::MediaStorage;

/// What the platform share sheet receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareContent {
    pub message: String,
    /// Downloaded copy of the post's media
    pub url: Option<PathBuf>,
}

/// Post body as plain text
pub fn share_message(body: &str) -> String {
    let stripped = ammonia::Builder::empty().clean(body).to_string();
    html_escape::decode_html_entities(&stripped).into_owned()
}

/// Message plus, for posts with media, a local copy of the file
pub async fn share_content(post: &Post, media: &MediaStorage) -> ShareContent {
    let url = match &post.row.file {
        Some(path) => media.download_file(&media.public_url(path)).await,
        None => None,
    };
    ShareContent {
        message: share_message(&post.row.body),
        url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_stripped() {
        assert_eq!(
            share_message("<p>Hello <b>world</b></p><p>again</p>"),
            "Hello worldagain"
        );
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(share_message("<p>Tom &amp; Jerry &lt;3</p>"), "Tom & Jerry <3");
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(share_message("just text"), "just text");
    }
}
