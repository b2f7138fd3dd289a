use serde::{Serialize, Deserialize};
use serde_with::{serde_as, base64::Base64};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use std::fmt;

use crate::error::StudioError;

/// Kind of copy requested. Unknown labels are kept verbatim so the prompt
/// builder can fall back to its generic directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
    ProductDescription,
    ProductReviews,
    SocialMediaPost,
    EmailCampaign,
    BlogPostIntro,
    AdCopy,
    Other(String),
}

impl ContentType {
    pub const KNOWN: [ContentType; 6] = [
        ContentType::ProductDescription,
        ContentType::ProductReviews,
        ContentType::SocialMediaPost,
        ContentType::EmailCampaign,
        ContentType::BlogPostIntro,
        ContentType::AdCopy,
    ];

    pub fn label(&self) -> &str {
        match self {
            ContentType::ProductDescription => "Product Description",
            ContentType::ProductReviews => "Product Reviews (3)",
            ContentType::SocialMediaPost => "Social Media Post",
            ContentType::EmailCampaign => "Email Campaign",
            ContentType::BlogPostIntro => "Blog Post Intro",
            ContentType::AdCopy => "Ad Copy",
            ContentType::Other(label) => label,
        }
    }
}

impl From<String> for ContentType {
    fn from(label: String) -> Self {
        match label.as_str() {
            "Product Description" => ContentType::ProductDescription,
            "Product Reviews (3)" => ContentType::ProductReviews,
            "Social Media Post" => ContentType::SocialMediaPost,
            "Email Campaign" => ContentType::EmailCampaign,
            "Blog Post Intro" => ContentType::BlogPostIntro,
            "Ad Copy" => ContentType::AdCopy,
            _ => ContentType::Other(label),
        }
    }
}

impl From<ContentType> for String {
    fn from(value: ContentType) -> Self {
        match value {
            ContentType::Other(label) => label,
            known => known.label().to_string(),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.label()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ContentLength {
    #[default]
    Default,
    Short,
    Medium,
    Long,
}

impl ContentLength {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentLength::Default => "Default",
            ContentLength::Short => "Short",
            ContentLength::Medium => "Medium",
            ContentLength::Long => "Long",
        }
    }
}

/// Image attached to a generation request; base64 on the wire.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductImage {
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub mime_type: String,
}

impl ProductImage {
    /// Declared media type, or the one sniffed from the bytes when none was sent.
    pub fn media_type(&self) -> Option<String> {
        let declared = self.mime_type.trim();
        if !declared.is_empty() {
            return Some(declared.to_string());
        }
        match image::guess_format(&self.data).ok()? {
            image::ImageFormat::Png => Some("image/png".into()),
            image::ImageFormat::Jpeg => Some("image/jpeg".into()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParameters {
    pub product_name: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub content_length: Option<ContentLength>,
    #[serde(default)]
    pub star_rating: Option<u8>,
    #[serde(default)]
    pub seo_keywords: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub occasion: Option<String>,
    #[serde(default)]
    pub brand_voice: Option<String>,
    #[serde(default)]
    pub generate_ab_test: bool,
    #[serde(default)]
    pub generate_social_post: bool,
    #[serde(default)]
    pub product_image: Option<ProductImage>,
}

impl GenerationParameters {
    pub fn new(product_name: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            product_name: product_name.into(),
            content_type,
            country: String::new(),
            tone: String::new(),
            content_length: None,
            star_rating: None,
            seo_keywords: None,
            company_name: None,
            occasion: None,
            brand_voice: None,
            generate_ab_test: false,
            generate_social_post: false,
            product_image: None,
        }
    }

    /// Boundary check run before a request reaches the prompt builder.
    pub fn validate(&self) -> Result<(), StudioError> {
        if self.product_name.trim().is_empty() {
            return Err(StudioError::InvalidParameters("productName is required".into()));
        }
        if self.content_type.label().trim().is_empty() {
            return Err(StudioError::InvalidParameters("contentType is required".into()));
        }
        if let Some(rating) = self.star_rating {
            if !(1..=5).contains(&rating) {
                return Err(StudioError::InvalidParameters(format!("starRating must be between 1 and 5, got {rating}")));
            }
        }
        if let Some(image) = &self.product_image {
            if image.data.is_empty() {
                return Err(StudioError::InvalidParameters("productImage is empty".into()));
            }
            match image.media_type() {
                Some(mime) if mime.starts_with("image/") => {}
                _ => return Err(StudioError::InvalidParameters("productImage has no usable image media type".into())),
            }
        }
        Ok(())
    }
}

/// Returns the trimmed value when present and not blank.
pub fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentChunk {
    pub id: usize,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: Uuid,
    pub params: GenerationParameters,
    pub raw_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A record together with the chunk view derived from its raw text.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordView {
    #[serde(flatten)]
    pub record: HistoryRecord,
    pub chunks: Vec<ContentChunk>,
}

impl From<HistoryRecord> for RecordView {
    fn from(record: HistoryRecord) -> Self {
        let chunks = crate::chunker::chunk(&record.raw_text);
        Self { record, chunks }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub theme: Theme,
    pub generation_count: u64,
    pub newsletter_subscribed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    #[serde(default)]
    pub theme: Option<Theme>,
    #[serde(default)]
    pub newsletter_subscribed: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditChunkRequest {
    pub body: String,
}
