use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactEncoding {
    Url,
    InlineBase64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaType {
    Jpeg,
    Png,
    Webp,
    Gif,
    Bmp,
    Mp4,
    Other(String),
}

impl MediaType {
    pub fn from_mime(mime: &str) -> Self {
        let lowered = mime.trim().to_ascii_lowercase();
        let essence = lowered.split(';').next().unwrap_or_default().trim();
        match essence {
            "image/jpeg" | "image/jpg" => Self::Jpeg,
            "image/png" => Self::Png,
            "image/webp" => Self::Webp,
            "image/gif" => Self::Gif,
            "image/bmp" => Self::Bmp,
            "video/mp4" => Self::Mp4,
            _ => Self::Other(essence.to_string()),
        }
    }

    pub fn as_mime(&self) -> &str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Mp4 => "video/mp4",
            Self::Other(mime) => mime.as_str(),
        }
    }

    pub fn extension(&self) -> &str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Mp4 => "mp4",
            Self::Other(_) => "bin",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

impl Serialize for MediaType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_mime())
    }
}

impl<'de> Deserialize<'de> for MediaType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_mime(&raw))
    }
}

/// Classifies a base64 payload by the encoded form of its magic bytes.
/// Anything unrecognized is assumed to be JPEG.
pub fn sniff_base64_media_type(payload: &str) -> MediaType {
    let head = payload.trim_start();
    if head.starts_with("/9j/") {
        MediaType::Jpeg
    } else if head.starts_with("iVBOR") {
        MediaType::Png
    } else if head.starts_with("UklGR") {
        MediaType::Webp
    } else if head.starts_with("R0lGO") {
        MediaType::Gif
    } else if head.starts_with("Qk") {
        MediaType::Bmp
    } else {
        MediaType::Jpeg
    }
}

/// Splits `data:<mime>;base64,<payload>` into its parts.
pub fn parse_data_url(value: &str) -> Option<(MediaType, &str)> {
    let rest = value.trim().strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let media_type = if mime.trim().is_empty() {
        sniff_base64_media_type(payload)
    } else {
        MediaType::from_mime(mime)
    };
    Some((media_type, payload))
}

pub fn is_remote_url(value: &str) -> bool {
    let trimmed = value.trim_start();
    trimmed.starts_with("https://") || trimmed.starts_with("http://")
}

/// Prefixes bare base64 with a sniffed MIME type. Data URLs and remote URLs
/// pass through untouched.
pub fn ensure_data_url(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.starts_with("data:") || is_remote_url(trimmed) {
        return trimmed.to_string();
    }
    format!(
        "data:{};base64,{}",
        sniff_base64_media_type(trimmed).as_mime(),
        trimmed
    )
}

/// Normalized result of one generation operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationArtifact {
    pub encoding: ArtifactEncoding,
    pub media_type: MediaType,
    pub payload: String,
}

impl GenerationArtifact {
    pub fn url(url: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            encoding: ArtifactEncoding::Url,
            media_type,
            payload: url.into(),
        }
    }

    /// Declared MIME wins; otherwise the payload is sniffed.
    pub fn inline(payload: impl Into<String>, declared: Option<&str>) -> Self {
        let payload = payload.into();
        let media_type = declared
            .map(str::trim)
            .filter(|mime| !mime.is_empty())
            .map(MediaType::from_mime)
            .unwrap_or_else(|| sniff_base64_media_type(&payload));
        Self {
            encoding: ArtifactEncoding::InlineBase64,
            media_type,
            payload,
        }
    }

    pub fn from_data_url(value: &str) -> Option<Self> {
        let (media_type, payload) = parse_data_url(value)?;
        Some(Self {
            encoding: ArtifactEncoding::InlineBase64,
            media_type,
            payload: payload.to_string(),
        })
    }

    pub fn is_inline(&self) -> bool {
        self.encoding == ArtifactEncoding::InlineBase64
    }

    pub fn to_data_url(&self) -> Option<String> {
        if !self.is_inline() {
            return None;
        }
        Some(format!(
            "data:{};base64,{}",
            self.media_type.as_mime(),
            self.payload
        ))
    }
}
