use crate::core::config::StoryConfig;
use crate::core::io::Storage;
use crate::core::state::{Persona, PersonaRole, Personas};
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::info;

/// Reads a portrait, sniffs its image type and encodes it for the backend.
pub async fn load_persona(storage: &dyn Storage, path: &str, role: PersonaRole) -> Result<Persona> {
    let bytes = storage.read(path).await?;
    let format = image::guess_format(&bytes)
        .with_context(|| format!("{} is not a supported image", path))?;
    info!("Loaded {} portrait from {} ({})", role.label(), path, format.to_mime_type());
    Ok(Persona {
        base64: BASE64.encode(&bytes),
        mime_type: format.to_mime_type().to_string(),
        desc: role.label().to_string(),
    })
}

/// Loads whichever portraits are configured. The hero is optional here;
/// launching the story checks for it.
pub async fn load_personas(storage: &dyn Storage, story: &StoryConfig) -> Result<Personas> {
    let mut personas = Personas::default();
    if let Some(path) = story.hero_image.as_deref().filter(|p| !p.trim().is_empty()) {
        personas.hero = Some(load_persona(storage, path, PersonaRole::Hero).await?);
    }
    if let Some(path) = story.mentor_image.as_deref().filter(|p| !p.trim().is_empty()) {
        personas.mentor = Some(load_persona(storage, path, PersonaRole::Mentor).await?);
    }
    Ok(personas)
}
