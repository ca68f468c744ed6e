use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Fixed display palette for collaborator badges.
pub const PALETTE: [&str; 8] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#42d4f4", "#f032e6", "#9a6324",
];

/// Deterministic badge color for a display name. Every client computes the
/// same answer, so no color assignment needs to be stored or coordinated.
pub fn color_for(name: &str) -> &'static str {
    let hash = blake3::hash(name.as_bytes());
    let bytes = hash.as_bytes();
    let n = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    PALETTE[n as usize % PALETTE.len()]
}

/// First letters of up to the first two words, uppercased.
pub fn initials(name: &str) -> String {
    let letters: String = name
        .split_whitespace()
        .take(2)
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect();
    if letters.is_empty() { "?".to_string() } else { letters }
}

/// A presence entry as listed to clients: annotated for display and
/// already filtered to the expiry window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveUser {
    pub user_id: UserId,
    pub name: String,
    pub tab: String,
    pub focused_field: Option<String>,
    pub last_seen_ms: u64,
    pub color: String,
    pub initials: String,
}

impl ActiveUser {
    pub fn new(
        user_id: UserId,
        name: &str,
        tab: &str,
        focused_field: Option<&str>,
        last_seen_ms: u64,
    ) -> Self {
        Self {
            user_id,
            name: name.to_string(),
            tab: tab.to_string(),
            focused_field: focused_field.map(str::to_string),
            last_seen_ms,
            color: color_for(name).to_string(),
            initials: initials(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_is_stable_and_in_palette() {
        let a = color_for("Allie Shidel");
        assert_eq!(a, color_for("Allie Shidel"));
        assert!(PALETTE.contains(&a));
    }

    #[test]
    fn palette_gets_spread() {
        let names = ["Ann", "Bo", "Cy", "Di", "Ed", "Flo", "Gus", "Hal", "Ivy", "Jo", "Kit", "Lu"];
        let distinct: std::collections::BTreeSet<_> = names.iter().map(|n| color_for(n)).collect();
        assert!(distinct.len() > 1);
    }

    #[test]
    fn initials_use_first_two_words() {
        assert_eq!(initials("Cheyenne Young"), "CY");
        assert_eq!(initials("mary jo van dyke"), "MJ");
        assert_eq!(initials("Prince"), "P");
        assert_eq!(initials("   "), "?");
    }
}
