use crate::core::catalog::{self, Role, CITIES, VISUAL_STYLES};
use crate::core::config::StoryConfig;
use crate::core::lore;
use crate::core::state::{Page, PageKind};

pub const STORY_START_MARKER: &str = "The story begins here.";

/// Story options with every gap filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorySettings {
    pub style: String,
    pub city: String,
    pub role: Role,
    pub language_code: String,
    pub rich_mode: bool,
}

impl StorySettings {
    pub fn from_config(story: &StoryConfig) -> Self {
        Self {
            style: story
                .style
                .clone()
                .unwrap_or_else(|| VISUAL_STYLES[0].to_string()),
            city: story.city.clone().unwrap_or_else(|| CITIES[0].to_string()),
            role: *catalog::find_role(story.role.as_deref().unwrap_or_default()),
            language_code: story
                .language
                .clone()
                .unwrap_or_else(|| "en-US".to_string()),
            rich_mode: story.rich_mode.unwrap_or(true),
        }
    }

    pub fn language_name(&self) -> &'static str {
        catalog::language_name(&self.language_code)
    }
}

impl Default for StorySettings {
    fn default() -> Self {
        Self::from_config(&StoryConfig::default())
    }
}

/// One chapter beat per page number. The last story page always resolves the
/// arc; numbers past the table keep the rising action going.
pub fn chapter_instruction(page: u32, max_story_pages: u32, s: &StorySettings) -> String {
    let city = &s.city;
    let role = s.role.name;
    let power = s.role.power;
    let mentor = lore::MENTOR_NAME;

    if page >= max_story_pages {
        return format!(
            "CHAPTER 3 RESOLUTION. The Echo returns to {city}—vibrant, safe, pulsing with life. The crowd gathers as music rises. {mentor} watches from rooftops: \"They know who we are now. Which means we have their attention. The next move is ours.\" {resistance} The ending MUST bridge to {mission}. The fight has just begun.",
            resistance = lore::RESISTANCE,
            mission = lore::MISSION,
        );
    }

    match page {
        1 => format!(
            "CHAPTER 1: THE CALL TO ACTION. {world} Show {city} beneath neon corporate billboards and algorithmic barriers. {signal} Visualize The Signal as flickering distortions erasing a vibrant Black queer cultural space. Include a recognizable {city} landmark being consumed by digital voids. The tone is urgent yet poetic.",
            world = lore::WORLD_BUILDING,
            signal = lore::THE_SIGNAL,
        ),
        2 => format!(
            "CHAPTER 1 CONTINUED. {cipher} From {archive} {mentor} sends an encrypted message to {role}. The message speaks of {echo} They are summoned to The Archive beneath the Thames. Use shadow, light, and whispered histories as visual metaphors.",
            cipher = lore::CIPHER,
            archive = lore::THE_ARCHIVE,
            echo = lore::THE_ECHO,
        ),
        3 => format!(
            "CHAPTER 1 CLIMAX. {role} arrives at The Archive. {mentor} stands before holographic projections of redacted documents, censored media, and digital voids where history used to be. He explains Urban Renewal 2.0—{renewal} Then he reveals The Nexus Engine: \"You are already powerful. This will only reveal what The Signal tried to suppress in you.\" {role} must decide how to commit to The OOMF Initiative.",
            renewal = lore::URBAN_RENEWAL,
        ),
        4 => format!(
            "CHAPTER 2: THE AWAKENING. {nexus} The recruits arrive—Fluxion, NovaCode, Lumina, VibraBolt (whoever {role} is NOT). They exchange glances: fear, excitement, doubt. Show The Nexus Chamber as cathedral-like, pulsing with power, ancient-meets-futuristic. The moment before transformation.",
            nexus = lore::THE_NEXUS_ENGINE,
        ),
        5 => format!(
            "CHAPTER 2 CONTINUED. One by one, they step into The Nexus Engine's energy field. Visual spectacle: swirling light and code, bodies illuminated, data conduits glowing. {role} feels the suppressed power awakening within them. Use imagery of light breaking through darkness, code rewriting itself, voices becoming audible."
        ),
        6 => format!(
            "CHAPTER 2 CONTINUED. Powers manifest! {role} discovers: {power}. Show the specific visual of their ability. Fluxion bends time. NovaCode repairs corrupted data. Lumina projects lost visuals. VibraBolt amplifies silenced voices. The chamber shudders with energy. They are The OOMF now."
        ),
        7 => format!(
            "CHAPTER 2 CLIMAX. The Nexus Chamber shudders violently. A pulse of distortion rips through The Archive—flickering error codes, dissonant frequencies. {signal} The Signal has detected them and is already fighting back. {mentor} shouts: \"The battle has already begun!\"",
            signal = lore::THE_SIGNAL,
        ),
        8 => format!(
            "CHAPTER 3: THE FIRST MISSION. The Signal's next target: the last underground house music sanctuary in {city}. The OOMF counter-attack! Action sequence with {role} and team using their powers. Fight with culture, energy, human connection—not just data. Use music/sound/light as weapons. Show digital infrastructure being hijacked, truth overwhelming misinformation."
        ),
        9 => format!(
            "CHAPTER 3 CLIMAX. The team infiltrates The Signal's data vaults—dark, cold, corporate. {role} uses {power} to expose hidden truths and lands the decisive broadcast that breaks The Signal's hold. The Echo begins to re-emerge—not just as a place, but as a movement. Show the contrast between sterile corporate space and vibrant cultural memory."
        ),
        _ => format!(
            "CHAPTER 3 CONTINUED. The OOMF push deeper against The Signal across {city}. {role} uses {power} while the team protects fragmented histories from erasure. Raise the stakes without resolving the conflict yet."
        ),
    }
}

pub fn decision_instruction(role: &str) -> String {
    format!(
        "DECISION POINT: End this page on a choice. Offer EXACTLY TWO meaningfully distinct options for how {} resists The Signal. Each option must reflect a different resistance strategy (memory, action, connection, defiance); never two variations of the same idea.",
        role
    )
}

/// Prior story pages in ascending order, one line each, with any resolved choice.
pub fn history_digest(history: &[Page]) -> String {
    let mut pages: Vec<&Page> = history
        .iter()
        .filter(|p| p.kind == PageKind::Story && p.narrative.is_some())
        .collect();
    pages.sort_by_key(|p| p.page_index);

    if pages.is_empty() {
        return STORY_START_MARKER.to_string();
    }

    pages
        .iter()
        .filter_map(|p| {
            let beat = p.narrative.as_ref()?;
            let mut line = format!(
                "[Page {}] [Focus: {}] (Caption: \"{}\") (Dialogue: \"{}\") (Scene: {})",
                p.page_index,
                beat.focus_char.as_str(),
                beat.caption.as_deref().unwrap_or(""),
                beat.dialogue.as_deref().unwrap_or(""),
                beat.scene,
            );
            if let Some(choice) = &p.resolved_choice {
                line.push_str(&format!(" -> USER CHOICE: \"{}\"", choice));
            }
            Some(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn narrative_prompt(
    page: u32,
    max_story_pages: u32,
    history: &[Page],
    is_decision_page: bool,
    s: &StorySettings,
) -> String {
    let lang = s.language_name();
    let role = s.role.name;
    let caption_rule = if s.rich_mode {
        "Max 35 words. Poetic yet urgent, use vivid sensory details."
    } else {
        "Max 15 words. Punchy and evocative."
    };

    let mut instruction = chapter_instruction(page, max_story_pages, s);
    if is_decision_page {
        instruction.push(' ');
        instruction.push_str(&decision_instruction(role));
    }

    let choices_line = if is_decision_page {
        "\"choices\": [\"Option A\", \"Option B\"] (exactly two, each a distinct resistance strategy)"
    } else {
        "\"choices\": [] (always empty on this page)"
    };

    format!(
        r#"
You are writing '{title}', an Afrofuturist Cyberpunk narrative set in {city}. PAGE {page} of {max}.

NARRATIVE VOICE: {tone}
AVOID: {avoid}
EMPHASIS: {emphasis}

LANGUAGE: {lang}
USER CHARACTER: {role} (Power: {power})
MENTOR: {cipher}

STORY CONTEXT:
{themes}

PREVIOUS PANELS:
{history}

INSTRUCTION FOR THIS PAGE: {instruction}

OUTPUT STRICT JSON ONLY:
{{
  "caption": "Narrative text in {lang}. {caption_rule}",
  "dialogue": "Character speech in {lang}. Essential lines only. Make it feel authentic and weighty.",
  "scene": "Visual description for image generator. MUST explicitly name {role} if they appear. MUST name {mentor_upper} if they appear. Include {city} landmarks where relevant. Use cyberpunk and Afrofuturist visual language: neon, data streams, holographic projections, cultural symbols.",
  "focus_char": "hero" ({role}) or "friend" ({mentor}) or "other" (Team/Signal),
  {choices_line}
}}
"#,
        title = lore::STORY_TITLE,
        city = s.city,
        max = max_story_pages,
        tone = lore::VOICE_TONE,
        avoid = lore::VOICE_AVOID.join(", "),
        emphasis = lore::VOICE_EMPHASIS,
        power = s.role.power,
        cipher = lore::CIPHER,
        themes = lore::THEMES,
        history = history_digest(history),
        mentor = lore::MENTOR_NAME,
        mentor_upper = lore::MENTOR_NAME.to_uppercase(),
    )
}
