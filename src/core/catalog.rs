// Selectable options offered by setup and consumed by the prompt builders.

pub const VISUAL_STYLES: &[&str] = &[
    "Afrofuturist Cyberpunk",
    "Multiverse Halftone (Spiderverse Style)",
    "Vintage 97 Cel-Shaded (X-Men Style)",
    "Sharp Urban Anime (Boondocks Style)",
    "Neon Noir Graphic Novel",
    "Afro-Punk Collage",
    "Neon Graffiti Futurism",
    "Solarpunk Utopia",
    "Digital Glitch Art",
    "Cinematic Photorealism",
];

pub const CITIES: &[&str] = &["London", "Manchester", "Birmingham", "Bristol", "Cardiff"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Role {
    pub id: &'static str,
    pub name: &'static str,
    pub power: &'static str,
}

pub const ROLES: &[Role] = &[
    Role {
        id: "fluxion",
        name: "Fluxion (The Journalist)",
        power: "Bends digital time & narratives",
    },
    Role {
        id: "novacode",
        name: "NovaCode (The Engineer)",
        power: "Reconstructs corrupted data",
    },
    Role {
        id: "lumina",
        name: "Lumina (The Filmmaker)",
        power: "Illuminates lost stories",
    },
    Role {
        id: "vibrabolt",
        name: "VibraBolt (The Organizer)",
        power: "Amplifies silenced voices",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
}

pub const LANGUAGES: &[Language] = &[
    Language { code: "en-US", name: "English (US)" },
    Language { code: "en-GB", name: "English (UK)" },
    Language { code: "ar-EG", name: "Arabic (Egypt)" },
    Language { code: "de-DE", name: "German (Germany)" },
    Language { code: "es-MX", name: "Spanish (Mexico)" },
    Language { code: "fr-FR", name: "French (France)" },
    Language { code: "ja-JP", name: "Japanese (Japan)" },
    Language { code: "pt-BR", name: "Portuguese (Brazil)" },
    Language { code: "zh-CN", name: "Chinese (China)" },
];

/// Unknown ids fall back to the first role.
pub fn find_role(id: &str) -> &'static Role {
    ROLES.iter().find(|r| r.id == id).unwrap_or(&ROLES[0])
}

pub fn language_name(code: &str) -> &'static str {
    LANGUAGES
        .iter()
        .find(|l| l.code == code)
        .map(|l| l.name)
        .unwrap_or("English")
}

pub fn style_description(style: &str) -> String {
    let known = match style {
        "Multiverse Halftone (Spiderverse Style)" => "Style: Modern animated feature film aesthetic. Key elements: Halftone patterns (Ben-Day dots), chromatic aberration, slight color shifting, dynamic graffiti textures. Vibrant neon colors against deep blacks. Exaggerated perspective and framing.",
        "Vintage 97 Cel-Shaded (X-Men Style)" => "Style: 1990s Saturday morning superhero animation. Key elements: Heavy black ink outlines, bold solid colors, dramatic cel-shading, hand-drawn aesthetic. Action cartoon look with muscular anatomy and dynamic lighting.",
        "Sharp Urban Anime (Boondocks Style)" => "Style: Sharp urban anime aesthetic. Key elements: Crisp clean line work, expressive character designs, flat shading, sophisticated composition. Muted earth tones mixed with specific vibrant accents. Influenced by adult animation.",
        "Afrofuturist Cyberpunk" => "Style: Afrofuturism meets Cyberpunk. Key elements: Neon-lit circuitry blended with traditional African patterns and textures. Gold accents, holographic displays, futuristic urban sprawl, bioluminescence.",
        "Neon Noir Graphic Novel" => "Style: Gritty noir graphic novel. Key elements: High contrast chiaroscuro lighting, deep shadows, rain-slicked streets, limited color palette with splashes of neon pink and blue. Cinematic composition.",
        "Afro-Punk Collage" => "Style: DIY Afro-Punk zine aesthetic. Key elements: Mixed media collage look, torn paper textures, spray paint splatter, xerox grain, bold typography elements, raw and energetic.",
        "Neon Graffiti Futurism" => "Style: Future street art. Key elements: Glowing neon spray paint, wildstyle shapes, fluorescent colors, urban decay mixed with high-tech overlays.",
        "Solarpunk Utopia" => "Style: Solarpunk. Key elements: Bright and optimistic, organic technology, art nouveau curves, lush greenery integrated with glass and gold metal, warm sunlight.",
        "Digital Glitch Art" => "Style: Glitch aesthetic. Key elements: Datamoshing, pixel sorting, CRT monitor scanlines, digital artifacts, distorted reality, cyberpunk data corruption visuals.",
        "Cinematic Photorealism" => "Style: High-budget sci-fi movie still. Key elements: Photorealistic textures, depth of field, volumetric lighting, lens flares, cinematic color grading.",
        _ => return format!("Style: {}. High quality, distinct visual identity.", style),
    };
    known.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_style_has_a_description() {
        for style in VISUAL_STYLES {
            let desc = style_description(style);
            assert!(
                !desc.contains("distinct visual identity"),
                "{} fell through to the generic description",
                style
            );
        }
    }

    #[test]
    fn test_unknown_style_uses_generic_description() {
        assert_eq!(
            style_description("Watercolor"),
            "Style: Watercolor. High quality, distinct visual identity."
        );
    }

    #[test]
    fn test_lookups_fall_back() {
        assert_eq!(find_role("lumina").name, "Lumina (The Filmmaker)");
        assert_eq!(find_role("nobody").id, "fluxion");
        assert_eq!(language_name("ja-JP"), "Japanese (Japan)");
        assert_eq!(language_name("xx-XX"), "English");
    }
}
