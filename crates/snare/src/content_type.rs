//! Content-type catalog.
//!
//! A closed set of body content types the engine can author and report,
//! mapped both ways to their wire MIME strings. Serialized as the MIME
//! string so rule files read naturally (`bodyContentType: application/json`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Body content type known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    #[default]
    TextPlain,
    ApplicationJson,
    ApplicationXml,
    TextXml,
    TextHtml,
    MultipartFormData,
    ApplicationFormUrlEncoded,
    ApplicationJavaScript,
    ApplicationPdf,
    ApplicationZip,
    AudioMpeg,
    AudioXWav,
    ImageGif,
    ImageJpeg,
    ImagePng,
    ImageTiff,
    ImageXIcon,
    ImageSvgXml,
    MultipartMixed,
    TextCss,
    TextCsv,
    VideoMpeg,
    VideoMp4,
    VideoXFlv,
    VideoWebm,
}

impl ContentType {
    /// Every variant, in catalog order.
    pub const ALL: [ContentType; 25] = [
        ContentType::TextPlain,
        ContentType::ApplicationJson,
        ContentType::ApplicationXml,
        ContentType::TextXml,
        ContentType::TextHtml,
        ContentType::MultipartFormData,
        ContentType::ApplicationFormUrlEncoded,
        ContentType::ApplicationJavaScript,
        ContentType::ApplicationPdf,
        ContentType::ApplicationZip,
        ContentType::AudioMpeg,
        ContentType::AudioXWav,
        ContentType::ImageGif,
        ContentType::ImageJpeg,
        ContentType::ImagePng,
        ContentType::ImageTiff,
        ContentType::ImageXIcon,
        ContentType::ImageSvgXml,
        ContentType::MultipartMixed,
        ContentType::TextCss,
        ContentType::TextCsv,
        ContentType::VideoMpeg,
        ContentType::VideoMp4,
        ContentType::VideoXFlv,
        ContentType::VideoWebm,
    ];

    /// Wire MIME string for this content type.
    pub fn mime(self) -> &'static str {
        match self {
            ContentType::TextPlain => "text/plain",
            ContentType::ApplicationJson => "application/json",
            ContentType::ApplicationXml => "application/xml",
            ContentType::TextXml => "text/xml",
            ContentType::TextHtml => "text/html",
            ContentType::MultipartFormData => "multipart/form-data",
            ContentType::ApplicationFormUrlEncoded => "application/x-www-form-urlencoded",
            ContentType::ApplicationJavaScript => "application/javascript",
            ContentType::ApplicationPdf => "application/pdf",
            ContentType::ApplicationZip => "application/zip",
            ContentType::AudioMpeg => "audio/mpeg",
            ContentType::AudioXWav => "audio/x-wav",
            ContentType::ImageGif => "image/gif",
            ContentType::ImageJpeg => "image/jpeg",
            ContentType::ImagePng => "image/png",
            ContentType::ImageTiff => "image/tiff",
            ContentType::ImageXIcon => "image/x-icon",
            ContentType::ImageSvgXml => "image/svg+xml",
            ContentType::MultipartMixed => "multipart/mixed",
            ContentType::TextCss => "text/css",
            ContentType::TextCsv => "text/csv",
            ContentType::VideoMpeg => "video/mpeg",
            ContentType::VideoMp4 => "video/mp4",
            ContentType::VideoXFlv => "video/x-flv",
            ContentType::VideoWebm => "video/webm",
        }
    }

    /// Look up a MIME string. Unknown strings yield `None`.
    ///
    /// Parameters after `;` are ignored and the comparison is
    /// case-insensitive, so `Application/JSON; charset=utf-8` resolves to
    /// [`ContentType::ApplicationJson`].
    pub fn from_mime(value: &str) -> Option<ContentType> {
        let essence = value.split(';').next().unwrap_or("").trim();
        ContentType::ALL
            .iter()
            .copied()
            .find(|ct| ct.mime().eq_ignore_ascii_case(essence))
    }

    /// Like [`ContentType::from_mime`], falling back to `text/plain`.
    pub fn from_mime_or_default(value: &str) -> ContentType {
        ContentType::from_mime(value).unwrap_or_default()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

impl Serialize for ContentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.mime())
    }
}

impl<'de> Deserialize<'de> for ContentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ContentType::from_mime(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown content type '{raw}'")))
    }
}
