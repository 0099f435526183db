use crate::core::catalog;
use crate::core::lore::MENTOR_NAME;
use crate::core::state::{Beat, ImagePayload, PageKind, Personas};
use crate::services::auth::CredentialMonitor;
use crate::services::llm::{ContentPart, ImageClient};
use crate::services::prompt::StorySettings;
use anyhow::anyhow;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

pub const PANEL_ASPECT_RATIO: &str = "2:3";

fn hero_reference_label(role: &str) -> String {
    format!(
        "REFERENCE IMAGE 1 - MAIN CHARACTER [{}]: This is the protagonist. Their appearance, facial features, skin tone, hair style, and body type MUST remain exactly consistent across all panels. Pay special attention to distinctive features.",
        role
    )
}

fn mentor_reference_label() -> String {
    format!(
        "REFERENCE IMAGE 2 - MENTOR {}: This is the mentor character. Their appearance, facial features, skin tone, hair style, and body type MUST remain exactly consistent across all panels. {} is a wise, tech-savvy strategist.",
        MENTOR_NAME.to_uppercase(),
        MENTOR_NAME
    )
}

fn first_panel_label(role: &str) -> String {
    format!(
        "REFERENCE IMAGE 3 - FIRST PANEL STYLE: This shows {} in the story's art style. Match this visual style, character rendering, and artistic approach for consistency.",
        role
    )
}

/// The text instruction that follows the reference images.
pub fn visual_prompt(beat: &Beat, kind: PageKind, personas: &Personas, s: &StorySettings) -> String {
    let role = s.role.name;
    let city = &s.city;
    let hero_desc = personas
        .hero
        .as_ref()
        .map(|p| format!(" {} appearance: {}", role, p.desc))
        .unwrap_or_default();
    let mentor_desc = personas
        .mentor
        .as_ref()
        .map(|p| format!(" {} appearance: {}", MENTOR_NAME, p.desc))
        .unwrap_or_default();

    let mut prompt = format!(
        "{} SETTING: Future {}. ",
        catalog::style_description(&s.style),
        city
    );

    match kind {
        PageKind::Cover => {
            prompt.push_str(&format!(
                "TYPE: Comic Book Cover. TITLE: \"THE OOMF\" (OR LOCALIZED IN {lang}). Visual: Heroic team shot with [{role}] in center matching REFERENCE IMAGE 1 exactly.{hero_desc} {city} skyline with recognisable landmarks in background with digital glitches.",
                lang = s.language_name().to_uppercase(),
            ));
        }
        PageKind::BackCover => {
            prompt.push_str(&format!(
                "TYPE: Comic Back Cover. Text: \"JOIN THE RESISTANCE\". Visual: A futuristic recruitment poster for 'The OOMF' resistance plastered on a textured urban wall in {city}. Graffiti style, high contrast, defiant energy."
            ));
        }
        PageKind::Story => {
            let mentor_upper = MENTOR_NAME.to_uppercase();
            prompt.push_str(&format!("TYPE: Vertical comic panel. SCENE: {}. ", beat.scene));
            prompt.push_str(&format!(
                "\n\nCRITICAL CHARACTER CONSISTENCY RULES:\n\
                 - If scene mentions '{role}' or 'HERO': Render them EXACTLY matching REFERENCE IMAGE 1. Same face, same facial features, same skin tone, same hairstyle, same build.{hero_desc}\n\
                 - If scene mentions '{mentor_upper}': Render them EXACTLY matching REFERENCE IMAGE 2. Same face, same facial features, same skin tone, same hairstyle, same build.{mentor_desc}\n\
                 - Unnamed supporting cast and team members (Fluxion, NovaCode, Lumina, VibraBolt): Render as distinct Black queer sci-fi characters with consistent futuristic attire.\n\
                 - Maintain consistent character appearance throughout the story. Do not alter facial features, skin tone, or distinctive characteristics."
            ));
            if let Some(caption) = &beat.caption {
                prompt.push_str(&format!("\n\nINCLUDE CAPTION BOX with text: \"{}\"", caption));
            }
            if let Some(dialogue) = &beat.dialogue {
                prompt.push_str(&format!("\n\nINCLUDE SPEECH BUBBLE with text: \"{}\"", dialogue));
            }
        }
    }
    prompt
}

/// Reference images first (hero, mentor, then the first story panel for story
/// pages only), each preceded by its label, then the instruction.
pub fn build_parts(
    beat: &Beat,
    kind: PageKind,
    personas: &Personas,
    first_panel: Option<&ImagePayload>,
    s: &StorySettings,
) -> Vec<ContentPart> {
    let mut parts = Vec::new();

    if let Some(hero) = personas.hero.as_ref().filter(|p| !p.base64.is_empty()) {
        parts.push(ContentPart::Text(hero_reference_label(s.role.name)));
        parts.push(ContentPart::Image(ImagePayload {
            mime_type: hero.mime_type.clone(),
            data: hero.base64.clone(),
        }));
    }
    if let Some(mentor) = personas.mentor.as_ref().filter(|p| !p.base64.is_empty()) {
        parts.push(ContentPart::Text(mentor_reference_label()));
        parts.push(ContentPart::Image(ImagePayload {
            mime_type: mentor.mime_type.clone(),
            data: mentor.base64.clone(),
        }));
    }
    if kind == PageKind::Story {
        if let Some(panel) = first_panel {
            parts.push(ContentPart::Text(first_panel_label(s.role.name)));
            parts.push(ContentPart::Image(panel.clone()));
        }
    }

    parts.push(ContentPart::Text(visual_prompt(beat, kind, personas, s)));
    parts
}

pub struct ImageGenerator {
    client: Arc<dyn ImageClient>,
    monitor: Arc<CredentialMonitor>,
    settings: StorySettings,
    timeout: Duration,
}

impl ImageGenerator {
    pub fn new(
        client: Arc<dyn ImageClient>,
        monitor: Arc<CredentialMonitor>,
        settings: StorySettings,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            monitor,
            settings,
            timeout,
        }
    }

    /// `None` on any failure; the error is reported to the credential monitor.
    pub async fn generate(
        &self,
        beat: &Beat,
        kind: PageKind,
        personas: &Personas,
        first_panel: Option<&ImagePayload>,
    ) -> Option<ImagePayload> {
        let parts = build_parts(beat, kind, personas, first_panel, &self.settings);

        let result = tokio::time::timeout(
            self.timeout,
            self.client.generate_image(&parts, PANEL_ASPECT_RATIO),
        )
        .await
        .map_err(|_| anyhow!("Image request timed out after {:?}", self.timeout))
        .and_then(|r| r);

        match result {
            Ok(Some(image)) => {
                info!("Image ready ({:?}, {})", kind, image.mime_type);
                Some(image)
            }
            Ok(None) => {
                warn!("Image backend returned no picture for {:?}", kind);
                None
            }
            Err(e) => {
                self.monitor.report("Image generation", &e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::Persona;
    use anyhow::Result;
    use async_trait::async_trait;

    fn persona(desc: &str) -> Persona {
        Persona {
            base64: "AAAA".to_string(),
            mime_type: "image/jpeg".to_string(),
            desc: desc.to_string(),
        }
    }

    fn panel() -> ImagePayload {
        ImagePayload {
            mime_type: "image/png".to_string(),
            data: "PANEL".to_string(),
        }
    }

    fn labels(parts: &[ContentPart]) -> Vec<String> {
        parts
            .iter()
            .map(|p| match p {
                ContentPart::Text(t) => t.split(" - ").next().unwrap_or("").to_string(),
                ContentPart::Image(i) => format!("<{}>", i.data),
            })
            .collect()
    }

    #[test]
    fn test_story_panel_references_in_priority_order() {
        let personas = Personas {
            hero: Some(persona("Main Agent")),
            mentor: Some(persona("Cipher (Mentor)")),
        };
        let beat = Beat {
            scene: "CIPHER hands over a data shard".to_string(),
            ..Default::default()
        };
        let parts = build_parts(&beat, PageKind::Story, &personas, Some(&panel()), &StorySettings::default());
        let labels = labels(&parts);
        assert_eq!(
            labels[..6],
            [
                "REFERENCE IMAGE 1",
                "<AAAA>",
                "REFERENCE IMAGE 2",
                "<AAAA>",
                "REFERENCE IMAGE 3",
                "<PANEL>"
            ]
        );
        assert_eq!(parts.len(), 7);
    }

    #[test]
    fn test_covers_never_use_first_panel_reference() {
        let personas = Personas {
            hero: Some(persona("Main Agent")),
            mentor: None,
        };
        let parts = build_parts(&Beat::default(), PageKind::Cover, &personas, Some(&panel()), &StorySettings::default());
        assert_eq!(parts.len(), 3);
        assert!(!labels(&parts).contains(&"<PANEL>".to_string()));

        let parts = build_parts(&Beat::back_cover(), PageKind::BackCover, &Personas::default(), Some(&panel()), &StorySettings::default());
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn test_story_prompt_carries_consistency_rules_and_overlays() {
        let beat = Beat {
            caption: Some("The Thames glows.".to_string()),
            dialogue: Some("We remember.".to_string()),
            scene: "Fluxion (The Journalist) at The Archive".to_string(),
            ..Default::default()
        };
        let prompt = visual_prompt(&beat, PageKind::Story, &Personas::default(), &StorySettings::default());
        assert!(prompt.starts_with("Style: Afrofuturism meets Cyberpunk."));
        assert!(prompt.contains("SETTING: Future London."));
        assert!(prompt.contains("SCENE: Fluxion (The Journalist) at The Archive."));
        assert!(prompt.contains("same skin tone, same hairstyle, same build"));
        assert!(prompt.contains("Unnamed supporting cast"));
        assert!(prompt.contains("INCLUDE CAPTION BOX with text: \"The Thames glows.\""));
        assert!(prompt.contains("INCLUDE SPEECH BUBBLE with text: \"We remember.\""));
    }

    #[test]
    fn test_unknown_style_falls_back_to_generic_description() {
        let settings = StorySettings {
            style: "Pastel Dreams".to_string(),
            ..Default::default()
        };
        let prompt = visual_prompt(&Beat::back_cover(), PageKind::BackCover, &Personas::default(), &settings);
        assert!(prompt.starts_with("Style: Pastel Dreams. High quality"));
        assert!(prompt.contains("JOIN THE RESISTANCE"));
    }

    #[derive(Debug)]
    struct SlowImageClient;

    #[async_trait]
    impl ImageClient for SlowImageClient {
        async fn generate_image(
            &self,
            _parts: &[ContentPart],
            _aspect_ratio: &str,
        ) -> Result<Option<ImagePayload>> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Some(panel()))
        }
    }

    #[tokio::test]
    async fn test_timeout_yields_no_image() {
        let monitor = Arc::new(CredentialMonitor::new());
        let generator = ImageGenerator::new(
            Arc::new(SlowImageClient),
            monitor.clone(),
            StorySettings::default(),
            Duration::from_millis(1),
        );
        let image = generator
            .generate(&Beat::fallback(), PageKind::Story, &Personas::default(), None)
            .await;
        assert!(image.is_none());
        assert!(!monitor.is_raised());
    }
}
