// World and voice text woven into every narrative prompt.

pub const STORY_TITLE: &str = "The OOMF Origin Story";
pub const MENTOR_NAME: &str = "Cipher";

pub const WORLD_BUILDING: &str = "The world is not falling apart—it is being systematically rewritten. Beneath the neon glow of corporate billboards, beyond the algorithmic barriers of social feeds, a silent war is being waged. Not with weapons, but with erasure. A force known only as The Signal manipulates information flows, restructures public narratives, and deletes histories that don't serve its agenda. It is the ultimate evolution of unbridled capitalism, built to flatten difference, reduce humans to consumers, and hoard knowledge for the privileged few.";

pub const THE_SIGNAL: &str = "The Signal is the antagonist—an entity that manipulates information flows, restructures public narratives, and deletes histories. It consumes entire communities, rewriting their past, present, and future. It is the ultimate evolution of unbridled capitalism, built to flatten difference and hoard knowledge for the privileged few.";

pub const THE_ECHO: &str = "The Echo is London's last true Black queer sanctuary. It has been erased—its digital presence wiped clean, its patrons scattered, and its legacy reduced to an algorithmic afterthought. It represents joy, struggle, resilience, and community that The Signal seeks to destroy.";

pub const THE_ARCHIVE: &str = "The Archive is an underground data vault hidden beneath the Thames in London, where the old city's ghosts whisper beneath modern glass towers. It is Cipher's base of operations, filled with holographic projections of redacted documents, censored media, and digital voids where history used to be.";

pub const THE_NEXUS_ENGINE: &str = "The Nexus Chamber is a cathedral-like space lined with glowing data conduits. At its heart stands The Nexus Engine, an ancient-meets-futuristic construct—a swirling core of light and code, capable of unlocking the latent potential within the recruits, revealing powers that The Signal tried to suppress.";

pub const CIPHER: &str = "Ivor \"Cipher\" Cummings is a former high-ranking civil servant who turned his back on the establishment after seeing firsthand how The Signal consumed entire communities. He watches from The Archive, initiating The OOMF (Officially Missing Our Future) to fight back against erasure. He is a strategist, mentor, and guardian of lost histories.";

pub const RESISTANCE: &str = "Resistance still breathes. The OOMF fight back not just with data, but with culture, energy, and human connection. They are activists, hackers, storytellers, and cultural guardians—already attuned to the cracks in The Signal's control.";

pub const URBAN_RENEWAL: &str = "Urban Renewal 2.0 is The Signal's citywide plan to erase the last vestiges of Black queer nightlife, replacing them with hyper-commercialized, surveillance-heavy entertainment districts. It represents systematic cultural erasure disguised as progress.";

pub const THEMES: &str = "The story explores systematic erasure vs. cultural preservation, algorithmic control vs. human connection, forgotten histories vs. active remembrance, and corporate capitalism vs. community resistance. The fight is not with weapons, but with memory, truth, and cultural power.";

pub const MISSION: &str = "BLKOUT UK's real mission: connecting Black queer communities to co-produce their own history";

pub const VOICE_TONE: &str = "Poetic yet urgent, mixing cyberpunk aesthetics with Afrofuturist optimism. Use vivid sensory details and metaphors related to light, sound, data, and energy.";

pub const VOICE_AVOID: &[&str] = &[
    "generic cyber threats",
    "simple good vs evil",
    "passive observation",
    "repetitive action descriptions",
    "oversimplified motivations",
];

pub const VOICE_EMPHASIS: &str = "Focus on the emotional weight of erasure, the power of community, and the specific cultural stakes. Make The Signal feel like an insidious, ever-present force rather than a simple villain. Ground the futurism in real UK locations and Black queer cultural spaces.";
