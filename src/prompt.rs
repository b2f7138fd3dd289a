//! Prompt construction for full generations and single-section rewrites.
//!
//! Everything here is a pure function of its inputs. Parameter validation
//! happens at the HTTP boundary, not here.

use crate::models::{non_blank, ContentChunk, ContentLength, ContentType, GenerationParameters, ProductImage};

const ROLE_INSTRUCTIONS: &str = "You are an expert e-commerce copywriter. Write persuasive, natural-sounding marketing copy \
that matches the requested tone and speaks to shoppers in the target country. \
Format the response in Markdown. Start every distinct section with a heading line of the form \"### Section Title\" \
and never use \"###\" anywhere else. Do not add any commentary before or after the content.";

pub const FALLBACK_DIRECTIVE: &str = "Write engaging marketing content for the product above that fits the requested content type and tone.";

pub const AB_TEST_DIRECTIVE: &str = "Also write an alternative version of the content for A/B testing. \
Put it after the main content under the heading \"### Variation B\", using a noticeably different angle or hook.";

pub const SOCIAL_POST_DIRECTIVE: &str = "Also write a short companion social media post promoting this content. \
Put it last under the heading \"### Companion Social Post\" and end it with 3-5 relevant hashtags.";

const IMAGE_NOTE: &str = "An image of the product is attached. Use its visible details (colour, material, style) in the copy.";

pub const EMAIL_TEMPLATE: &str = "### Subject Line\n[subject line]\n\n### Email Body\n[email body ending with the CTA button text in square brackets]";

pub const AD_TEMPLATE: &str = "### Ad 1: [headline]\n[body text]\n\n### Ad 2: [headline]\n[body text]";

/// Prompt text plus the image that accompanies it, ready for the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image: Option<ProductImage>,
}

/// Builds the request for a full generation, or for a single section when
/// `target` is given.
pub fn build_request(params: &GenerationParameters, target: Option<&ContentChunk>) -> GenerationRequest {
    let prompt = match target {
        Some(chunk) => build_regeneration_prompt(params, chunk),
        None => build_prompt(params),
    };
    GenerationRequest { prompt, image: params.product_image.clone() }
}

pub fn build_prompt(params: &GenerationParameters) -> String {
    let mut lines: Vec<String> = vec![ROLE_INSTRUCTIONS.to_string(), String::new()];

    lines.push(format!("**Product Name/Link:** {}", params.product_name.trim()));
    lines.push(format!("**Content Type:** {}", params.content_type));
    push_labeled(&mut lines, "Target Country", Some(params.country.as_str()));
    push_labeled(&mut lines, "Tone of Voice", Some(params.tone.as_str()));
    push_labeled(&mut lines, "Company Name", non_blank(&params.company_name));
    push_labeled(&mut lines, "Occasion", non_blank(&params.occasion));
    push_labeled(&mut lines, "SEO Keywords", non_blank(&params.seo_keywords));
    if let Some(length) = params.content_length.filter(|l| *l != ContentLength::Default) {
        lines.push(format!("**Content Length:** {}", length.as_str()));
    }
    if params.content_type == ContentType::ProductReviews {
        if let Some(rating) = params.star_rating {
            lines.push(format!("**Star Rating:** {rating}/5"));
        }
    }
    push_labeled(&mut lines, "Brand Voice Guidelines", non_blank(&params.brand_voice));
    if params.product_image.is_some() {
        lines.push(IMAGE_NOTE.to_string());
    }

    lines.push(String::new());
    lines.push(format!("**Task:** {}", task_directive(params)));

    if params.generate_ab_test {
        lines.push(String::new());
        lines.push(AB_TEST_DIRECTIVE.to_string());
    }
    if params.generate_social_post {
        lines.push(String::new());
        lines.push(SOCIAL_POST_DIRECTIVE.to_string());
    }
    lines.join("\n")
}

fn push_labeled(lines: &mut Vec<String>, label: &str, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        lines.push(format!("**{label}:** {v}"));
    }
}

/// Content-type specific instruction, the heart of the prompt.
pub fn task_directive(params: &GenerationParameters) -> String {
    let hook = seo_hook_directive(params).map(|h| format!(" {h}")).unwrap_or_default();
    match &params.content_type {
        ContentType::ProductDescription => {
            let mut directive = format!(
                "Write a compelling product description.{hook} Highlight the key features and the benefits they bring to the buyer, \
                and finish with a clear call to action."
            );
            if let Some(length) = length_directive(params.content_length) {
                directive.push(' ');
                directive.push_str(length);
            }
            directive
        }
        ContentType::ProductReviews => {
            let mut directive = String::from(
                "Write three distinct customer reviews, each from a different persona (for example a gift buyer, a daily user and a first-time customer). \
                Give each review its own \"### \" heading with the reviewer's name and persona.",
            );
            if let Some(rating) = params.star_rating {
                directive.push(' ');
                directive.push_str(&star_rating_directive(rating));
            }
            directive
        }
        ContentType::SocialMediaPost => format!(
            "Write a social media post suited to the platform conventions of the target audience.{hook} \
            Keep it punchy and end with a line of relevant hashtags."
        ),
        ContentType::EmailCampaign => format!(
            "Write a marketing email with an attention-grabbing subject line and a short text for the call-to-action button.{hook} \
            Use exactly this output template:\n{EMAIL_TEMPLATE}"
        ),
        ContentType::BlogPostIntro => format!(
            "Write a single engaging introductory paragraph for a blog post about the product that makes the reader want to keep reading.{hook}"
        ),
        ContentType::AdCopy => format!(
            "Write exactly two ad variations, each with a short headline and body text. Use exactly this output template:\n{AD_TEMPLATE}"
        ),
        ContentType::Other(_) => FALLBACK_DIRECTIVE.to_string(),
    }
}

/// Present only when there are keywords to weave in and a product to hook them to.
pub fn seo_hook_directive(params: &GenerationParameters) -> Option<String> {
    let keywords = non_blank(&params.seo_keywords)?;
    let product = params.product_name.trim();
    if product.is_empty() {
        return None;
    }
    Some(format!(
        "Open with a hook sentence about {product} that naturally includes these SEO keywords: {keywords}."
    ))
}

pub fn length_directive(length: Option<ContentLength>) -> Option<&'static str> {
    match length? {
        ContentLength::Default => None,
        ContentLength::Short => Some("Keep it short: around 50 words."),
        ContentLength::Medium => Some("Aim for a medium length: around 100-150 words."),
        ContentLength::Long => Some("Make it long and detailed: around 250-300 words."),
    }
}

pub fn star_glyphs(rating: u8) -> String {
    let filled = usize::from(rating.min(5));
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

fn star_rating_directive(rating: u8) -> String {
    let rating = rating.clamp(1, 5);
    format!(
        "Every review must reflect a {rating} out of 5 star experience and show the rating as {} on the line under its heading.",
        star_glyphs(rating)
    )
}

/// Wraps the full generation prompt so the model rewrites one section only.
pub fn build_regeneration_prompt(params: &GenerationParameters, chunk: &ContentChunk) -> String {
    let base = build_prompt(params);
    format!(
        "You are rewriting one section of marketing copy that was generated earlier.\n\n\
        Section to rewrite: \"{title}\"\n\n\
        Current text of this section:\n\"\"\"\n{body}\n\"\"\"\n\n\
        Write a fresh version of this section only. Return only the raw replacement text for the section. \
        Do not include a \"###\" heading, the section title, or any commentary.\n\n\
        For reference, these were the original instructions for the full content:\n---\n{base}\n---",
        title = chunk.title,
        body = chunk.body,
    )
}
