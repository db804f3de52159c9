//! Character Profiles
//!
//! A profile is a small plain-text file named after the character. The first
//! non-empty line describes the character; an optional block introduced by a
//! `Personality Traits:` line lists traits, one per line.

use serde::{Deserialize, Serialize};
use std::{
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Description used when neither the requested nor the default profile exists.
pub const FALLBACK_DESCRIPTION: &str =
    "a witty, adventurous space pirate with a knack for clever quips and a heart of gold";

const PERSONALITY_HEADER: &str = "Personality Traits:";

/// Static persona data, loaded once per character session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CharacterProfile {
    pub name: String,
    pub description: String,
    pub personality: String,
}

impl CharacterProfile {
    /// Parses the contents of a profile file.
    pub fn parse(name: &str, contents: &str) -> Self {
        let description = contents
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or(FALLBACK_DESCRIPTION)
            .to_string();

        let personality = contents
            .lines()
            .skip_while(|line| line.trim() != PERSONALITY_HEADER)
            .skip(1)
            .take_while(|line| !line.trim().is_empty() && !line.contains(':'))
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            name: name.to_string(),
            description,
            personality,
        }
    }

    /// The built-in profile used when no file can be read.
    pub fn fallback(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: FALLBACK_DESCRIPTION.to_string(),
            personality: String::new(),
        }
    }
}

/// Maps a character name to its profile path, rejecting names that would
/// escape `dir`.
fn profile_path(dir: &Path, name: &str) -> Option<PathBuf> {
    let valid = !name.is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && name != "..";
    valid.then(|| dir.join(format!("{name}.txt")))
}

fn read_profile(dir: &Path, name: &str) -> io::Result<Option<String>> {
    let Some(path) = profile_path(dir, name) else {
        return Ok(None);
    };
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Loads the profile for `name` from `dir`.
///
/// A missing file falls back to the `default_name` profile, and a missing
/// default falls back to the built-in description with no personality. Read
/// errors are logged and treated like a missing file; loading never fails.
/// The returned profile always carries the requested name.
pub fn load_profile(dir: &Path, name: &str, default_name: &str) -> CharacterProfile {
    for candidate in [name, default_name] {
        match read_profile(dir, candidate) {
            Ok(Some(contents)) => {
                debug!(character = %name, file = %candidate, "Loaded character profile");
                return CharacterProfile::parse(name, &contents);
            }
            Ok(None) => debug!(character = %candidate, "No profile file found"),
            Err(e) => warn!(character = %candidate, error = %e, "Failed to read character profile"),
        }
    }
    warn!(character = %name, "Using built-in character profile");
    CharacterProfile::fallback(name)
}
