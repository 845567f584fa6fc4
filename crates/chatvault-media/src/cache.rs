//! Local cache of decrypted attachments, one directory per chat.

use std::path::{Component, Path, PathBuf};

use chatvault_shared::{ChatAddress, StoreLayout};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::error::{MediaError, Result};

#[derive(Debug, Clone)]
pub struct MediaCache {
    layout: StoreLayout,
}

impl MediaCache {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Deterministic `<store>/<chat-dir>/<filename>` path.
    ///
    /// Both the chat directory and the filename must be a single normal path
    /// component; anything that could escape the store is rejected.
    pub fn target_path(&self, chat: &ChatAddress, filename: &str) -> Result<PathBuf> {
        let dir = chat.dir_name();
        ensure_single_component(&dir)?;
        ensure_single_component(filename)?;
        Ok(self.layout.chat_dir(chat).join(filename))
    }

    /// Absolute path of a cached file, or `None` when it is not cached yet.
    pub async fn lookup(&self, path: &Path) -> Result<Option<PathBuf>> {
        match fs::canonicalize(path).await {
            Ok(abs) if abs.is_file() => Ok(Some(abs)),
            Ok(_) => Err(MediaError::InvalidPath(path.display().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `data` to `path` through a temporary sibling and a rename, so
    /// readers only ever see a complete file. Returns the absolute path.
    pub async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<PathBuf> {
        let parent = path
            .parent()
            .ok_or_else(|| MediaError::InvalidPath(path.display().to_string()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MediaError::InvalidPath(path.display().to_string()))?;

        fs::create_dir_all(parent).await?;

        let tmp = parent.join(format!(".{name}.{}.part", Uuid::new_v4()));
        if let Err(e) = write_then_rename(&tmp, path, data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), bytes = data.len(), "cached media file");
        Ok(fs::canonicalize(path).await?)
    }
}

async fn write_then_rename(tmp: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    fs::write(tmp, data).await?;
    fs::rename(tmp, path).await
}

fn ensure_single_component(name: &str) -> Result<()> {
    let invalid = || MediaError::InvalidPath(name.to_string());

    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return Err(invalid());
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(dir: &tempfile::TempDir) -> MediaCache {
        MediaCache::new(StoreLayout::new(dir.path()))
    }

    #[test]
    fn target_path_lives_under_chat_dir() {
        let dir = tempfile::tempdir().unwrap();
        let chat = ChatAddress::new("15551234567:3@s.whatsapp.net");
        let path = cache(&dir).target_path(&chat, "photo.jpg").unwrap();
        assert_eq!(
            path,
            dir.path().join("15551234567_3@s.whatsapp.net").join("photo.jpg")
        );
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir);
        let chat = ChatAddress::new("123@g.us");

        for bad in ["", ".", "..", "../escape.jpg", "a/b.jpg", "a\\b.jpg", "/etc/passwd"] {
            assert!(
                matches!(cache.target_path(&chat, bad), Err(MediaError::InvalidPath(_))),
                "{bad:?} accepted"
            );
        }
        assert!(cache
            .target_path(&ChatAddress::new(".."), "x.jpg")
            .is_err());
        assert!(cache
            .target_path(&ChatAddress::new("../x@g.us"), "x.jpg")
            .is_err());
    }

    #[tokio::test]
    async fn atomic_write_leaves_only_the_final_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir);
        let target = cache
            .target_path(&ChatAddress::new("123@g.us"), "note.ogg")
            .unwrap();

        assert!(cache.lookup(&target).await.unwrap().is_none());

        let abs = cache.write_atomic(&target, b"payload").await.unwrap();
        assert!(abs.is_absolute());
        assert_eq!(std::fs::read(&abs).unwrap(), b"payload");
        assert_eq!(cache.lookup(&target).await.unwrap(), Some(abs));

        let entries: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("note.ogg")]);
    }
}
