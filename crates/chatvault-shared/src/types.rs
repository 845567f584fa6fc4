use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::GROUP_SERVER;

/// Kind of attachment carried by a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }

    /// Name given to an inbound attachment that did not declare one.
    pub fn default_filename(&self, timestamp: DateTime<Utc>) -> String {
        let stamp = timestamp.format("%Y%m%d_%H%M%S");
        match self {
            Self::Image => format!("image_{stamp}.jpg"),
            Self::Video => format!("video_{stamp}.mp4"),
            Self::Audio => format!("audio_{stamp}.ogg"),
            Self::Document => format!("document_{stamp}"),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMediaKind(pub String);

impl fmt::Display for UnknownMediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown media kind: {}", self.0)
    }
}

impl std::error::Error for UnknownMediaKind {}

impl FromStr for MediaKind {
    type Err = UnknownMediaKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "document" => Ok(Self::Document),
            other => Err(UnknownMediaKind(other.to_string())),
        }
    }
}

/// Protocol-level chat address, `user@server`.
///
/// Group conversations live on the `g.us` server; everything else is an
/// individual chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ChatAddress(String);

impl ChatAddress {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Part before the `@`, or the whole address when there is none.
    pub fn user(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(user, _)| user)
    }

    pub fn server(&self) -> Option<&str> {
        self.0.split_once('@').map(|(_, server)| server)
    }

    pub fn is_group(&self) -> bool {
        self.server() == Some(GROUP_SERVER)
    }

    /// Directory name used for this chat's cached media.
    pub fn dir_name(&self) -> String {
        self.0.replace(':', "_")
    }
}

impl fmt::Display for ChatAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn media_kind_parses_its_own_names() {
        for kind in [
            MediaKind::Image,
            MediaKind::Video,
            MediaKind::Audio,
            MediaKind::Document,
        ] {
            assert_eq!(kind.as_str().parse::<MediaKind>().unwrap(), kind);
        }
        assert!("sticker".parse::<MediaKind>().is_err());
    }

    #[test]
    fn default_filenames_use_the_message_time() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(MediaKind::Audio.default_filename(ts), "audio_20240309_140507.ogg");
        assert_eq!(MediaKind::Document.default_filename(ts), "document_20240309_140507");
    }

    #[test]
    fn chat_address_shapes() {
        let group = ChatAddress::new("120363025@g.us");
        assert!(group.is_group());
        assert_eq!(group.user(), "120363025");

        let direct = ChatAddress::new("15551234567@s.whatsapp.net");
        assert!(!direct.is_group());
        assert_eq!(direct.server(), Some("s.whatsapp.net"));

        let bare = ChatAddress::new("status");
        assert_eq!(bare.user(), "status");
        assert_eq!(bare.server(), None);
    }

    #[test]
    fn dir_name_replaces_colons() {
        let addr = ChatAddress::new("15551234567:12@s.whatsapp.net");
        assert_eq!(addr.dir_name(), "15551234567_12@s.whatsapp.net");
    }
}
