use std::sync::Arc;

use super::PromptError;
use crate::providers::TextCompletionProvider;

/// Longest LLM-authored scene text kept before the requirements suffix.
pub const MAX_AUTHORED_PROMPT_CHARS: usize = 700;
/// Photos mentioned to the text provider at most.
const MAX_PHOTOS_DESCRIBED: usize = 2;

const DEFAULT_STYLE_DESCRIPTION: &str = "Create a professional headshot of the person in the reference photos. \
Neutral light-grey background, soft even studio lighting, head and shoulders framing, \
friendly and confident expression, sharp focus on the face.";

const STYLES: &[(&str, &str)] = &[
    (
        "professional_indoor",
        "Create a professional portrait of the person in the reference photos inside a modern, bright office. \
Soft natural window light, blurred workspace in the background, head and shoulders framing, \
approachable and confident expression.",
    ),
    (
        "professional_outdoor",
        "Create a professional portrait of the person in the reference photos outdoors in a business district. \
Golden-hour daylight, softly blurred city buildings and greenery behind, waist-up framing, \
relaxed and confident posture.",
    ),
    (
        "corporate_studio",
        "Create a corporate studio headshot of the person in the reference photos. \
Solid dark-grey backdrop, classic three-point lighting, centered head and shoulders framing, \
composed and trustworthy expression.",
    ),
    (
        "creative_workspace",
        "Create a portrait of the person in the reference photos in a creative studio with plants, \
design boards and warm wooden furniture. Warm ambient lighting, shallow depth of field, \
natural and engaged expression.",
    ),
    (
        "conference_speaker",
        "Create a photo of the person in the reference photos speaking on a conference stage. \
Stage lighting with a softly lit audience and screen in the background, mid-shot framing, \
engaged and articulate expression.",
    ),
    (
        "casual_professional",
        "Create a relaxed professional portrait of the person in the reference photos in a bright café \
or co-working space. Natural daylight, soft background blur, friendly smile, \
approachable body language.",
    ),
    (
        "business_formal",
        "Create a formal executive portrait of the person in the reference photos in a wood-panelled \
boardroom. Controlled warm lighting, head and shoulders framing, \
poised and authoritative expression.",
    ),
    (
        "tech_startup",
        "Create a portrait of the person in the reference photos in a modern tech startup office with \
glass walls and screens. Cool daylight, open-plan background softly blurred, \
energetic and approachable expression.",
    ),
];

const FIDELITY_BLOCK: &str = "IDENTITY REQUIREMENTS:\n\
- Keep the exact same person: same eyes, same face shape, same nose and mouth.\n\
- Keep the same hairstyle, hair color and skin tone.\n\
- Keep the original clothing from the reference photos.\n\
- Exactly one person in the image, no additional people.\n\
- Photorealistic result, no illustration, no cartoon, no heavy retouching.";

const AUTHOR_SYSTEM_INSTRUCTION: &str = "You write prompts for an image model that creates a professional \
photo of a user to illustrate their LinkedIn post. Read the post, find its theme and describe ONE \
realistic scene in at most 120 words: setting, lighting, framing, posture and expression. \
Map themes to settings, for example: corporate or leadership -> modern office or boardroom; \
fitness or health -> gym or outdoor run; technology -> startup office with screens; \
public speaking or events -> conference stage; travel -> recognizable outdoor location; \
education -> classroom or library; celebration or milestone -> bright team space. \
Never describe the person's face, hair or clothes: they come from the reference photos. \
Answer with the scene description only.";

const REQUIREMENTS_SUFFIX: &str = "REQUIREMENTS:\n\
- A single person, the one from the reference photos.\n\
- Preserve the face exactly: eyes, face shape, hairstyle, skin tone.\n\
- Keep the clothing from the reference photos.\n\
- Photorealistic, professional quality.\n\
- Square 1:1 aspect ratio.\n\
- No text, no logo, no watermark.";

/// Scene text for `style_key`; unknown keys fall back to a neutral headshot.
pub fn style_description(style_key: &str) -> &'static str {
    let key = style_key.trim().to_ascii_lowercase();
    STYLES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, description)| *description)
        .unwrap_or(DEFAULT_STYLE_DESCRIPTION)
}

pub fn known_styles() -> impl Iterator<Item = &'static str> {
    STYLES.iter().map(|(name, _)| *name)
}

pub fn compose_style_prompt(style_key: &str) -> String {
    format!("{}\n\n{}", style_description(style_key), FIDELITY_BLOCK)
}

/// Collapses whitespace and caps length on a char boundary.
pub fn normalize_authored_text(raw: &str, max_chars: usize) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_chars) {
        Some((cut, _)) => collapsed[..cut].trim_end().to_string(),
        None => collapsed,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthoredPrompt {
    /// Text returned by the provider, trimmed.
    pub raw: String,
    /// Normalized text plus the fixed requirements; what the image model gets.
    pub optimized: String,
}

/// Builds prompts for the free-text flow.
#[derive(Clone)]
pub struct PromptComposer {
    text_provider: Arc<dyn TextCompletionProvider>,
}

impl PromptComposer {
    pub fn new(text_provider: Arc<dyn TextCompletionProvider>) -> Self {
        Self { text_provider }
    }

    pub async fn compose_from_post_text(
        &self,
        post_text: &str,
        photo_count: usize,
    ) -> Result<AuthoredPrompt, PromptError> {
        let described = photo_count.min(MAX_PHOTOS_DESCRIBED);
        let user_message = format!(
            "LinkedIn post:\n\"\"\"\n{}\n\"\"\"\n\nThe user provided {described} reference photo(s) of themselves.",
            post_text.trim()
        );
        let content = self
            .text_provider
            .complete(AUTHOR_SYSTEM_INSTRUCTION, &user_message)
            .await?;
        let raw = content
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(PromptError::Empty)?;

        let scene = normalize_authored_text(&raw, MAX_AUTHORED_PROMPT_CHARS);
        tracing::info!(raw_len = raw.len(), scene_len = scene.len(), "prompt authored");
        Ok(AuthoredPrompt {
            optimized: format!("{scene}\n\n{REQUIREMENTS_SUFFIX}"),
            raw,
        })
    }
}
