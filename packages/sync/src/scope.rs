//! Which keys take part in a sync run.
//!
//! A scope is applied to the local listing and the remote catalog alike,
//! so keys outside it are neither uploaded nor treated as orphans.

/// Entry point of the site, synced alone by [`Scope::IndexOnly`].
pub const INDEX_FILE: &str = "index.html";

/// Extensions of generated thumbnail renditions.
const THUMBNAIL_EXTENSIONS: &[&str] = &[".jpg", ".avif"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scope {
    /// Every key.
    #[default]
    All,
    /// Everything except thumbnail renditions, which are slow to
    /// regenerate and rarely change.
    SkipThumbs,
    /// Only the site index.
    IndexOnly,
}

impl Scope {
    #[must_use]
    pub fn includes(self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::SkipThumbs => !is_thumbnail(key),
            Self::IndexOnly => key == INDEX_FILE,
        }
    }
}

/// Returns `true` for thumbnail renditions.
#[must_use]
pub fn is_thumbnail(key: &str) -> bool {
    THUMBNAIL_EXTENSIONS.iter().any(|ext| key.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_thumbs_excludes_renditions_only() {
        assert!(!Scope::SkipThumbs.includes("cat.jpg"));
        assert!(!Scope::SkipThumbs.includes("cat.avif"));
        assert!(Scope::SkipThumbs.includes("cat.png"));
        assert!(Scope::SkipThumbs.includes("index.html"));
    }

    #[test]
    fn index_only_keeps_just_the_index() {
        assert!(Scope::IndexOnly.includes("index.html"));
        assert!(!Scope::IndexOnly.includes("about.html"));
    }

    #[test]
    fn all_includes_everything() {
        assert!(Scope::All.includes("cat.jpg"));
        assert!(Scope::All.includes(""));
    }
}
