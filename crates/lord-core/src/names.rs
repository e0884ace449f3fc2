//! Human-readable display names (`adjective_name`).
//!
//! Names are cosmetic and not guaranteed unique; identifiers are the keys.

const ADJECTIVES: &[&str] = &[
    "brave", "calm", "clever", "eager", "fancy", "gentle", "happy", "jolly", "kind", "lively",
    "lucky", "merry", "nimble", "proud", "quick", "quiet", "sharp", "steady", "swift", "witty",
];

const NAMES: &[&str] = &[
    "ada", "alan", "barbara", "dennis", "edsger", "frances", "grace", "hedy", "ken", "linus",
    "margaret", "niklaus", "radia", "rob", "sophie", "tony", "ursula", "vint", "whitfield",
    "yukihiro",
];

/// Generate a random `adjective_name` display name.
pub fn generate() -> String {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    let adjective = ADJECTIVES[usize::from(bytes[0]) % ADJECTIVES.len()];
    let name = NAMES[usize::from(bytes[1]) % NAMES.len()];
    format!("{adjective}_{name}")
}
