use indexmap::IndexMap;

/// Built-in alias table: transcription variant -> display name.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    // Phonetic variants of people who recommend things on air.
    ("kayo", "Keo"),
    ("kio", "Keo"),
    ("keyo", "Keo"),
    ("keeo", "Keo"),
    ("mark kermod", "Mark Kermode"),
    ("mark curmode", "Mark Kermode"),
    ("mark car mode", "Mark Kermode"),
    // Publications, abbreviated and spelled out.
    ("nyt", "The New York Times"),
    ("ny times", "The New York Times"),
    ("new york times", "The New York Times"),
    ("la times", "Los Angeles Times"),
    ("l.a. times", "Los Angeles Times"),
    ("lat", "Los Angeles Times"),
    ("guardian", "The Guardian"),
    ("rt", "Rotten Tomatoes"),
    ("av club", "The A.V. Club"),
    ("a.v. club", "The A.V. Club"),
    ("the av club", "The A.V. Club"),
];

/// Canonicalizes recommender names and publication titles.
///
/// Lookup is exact on the trimmed, lowercased input; anything else is
/// title-cased. Every display name is also registered under its own
/// lowercased form, which keeps `normalize` idempotent.
#[derive(Debug, Clone)]
pub struct RecommenderNormalizer {
    aliases: IndexMap<String, String>,
}

impl RecommenderNormalizer {
    /// Normalizer with the built-in table only.
    #[must_use]
    pub fn new() -> Self {
        Self::with_aliases(std::iter::empty::<(String, String)>())
    }

    /// Normalizer with extra aliases layered over the built-in table.
    pub fn with_aliases<I, K, V>(extra: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut aliases = IndexMap::new();
        let pairs = BUILTIN_ALIASES
            .iter()
            .map(|(alias, canonical)| ((*alias).to_string(), (*canonical).to_string()))
            .chain(extra.into_iter().map(|(alias, canonical)| {
                (alias.as_ref().to_string(), canonical.as_ref().trim().to_string())
            }))
            .filter(|(alias, canonical)| !alias.trim().is_empty() && !canonical.is_empty());
        for (alias, canonical) in pairs {
            aliases.insert(alias.trim().to_lowercase(), canonical);
        }

        // Display names always resolve to themselves, even when an alias key
        // spells one of them; values are rewritten onto the surviving spelling.
        let display: IndexMap<String, String> = aliases
            .values()
            .map(|canonical| (canonical.to_lowercase(), canonical.clone()))
            .collect();
        for canonical in aliases.values_mut() {
            if let Some(name) = display.get(&canonical.to_lowercase()) {
                canonical.clone_from(name);
            }
        }
        aliases.extend(display);
        Self { aliases }
    }

    /// Returns the canonical display form of `raw`.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return raw.to_string();
        }
        if let Some(canonical) = self.aliases.get(&trimmed.to_lowercase()) {
            return canonical.clone();
        }
        title_case(trimmed)
    }

    /// Whether `raw` hits the alias table.
    #[must_use]
    pub fn is_known(&self, raw: &str) -> bool {
        self.aliases.contains_key(&raw.trim().to_lowercase())
    }
}

impl Default for RecommenderNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|token| {
            let mut chars = token.chars();
            chars.next().map_or_else(String::new, |first| {
                let rest = chars.flat_map(char::to_lowercase);
                let upper = first.to_uppercase();
                // Multi-char uppercase forms ("ß" -> "SS") would not survive a second pass.
                if upper.len() == 1 {
                    upper.chain(rest).collect()
                } else {
                    std::iter::once(first).chain(rest).collect()
                }
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
