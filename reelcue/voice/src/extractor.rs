use once_cell::sync::Lazy;
use regex::Regex;

use crate::command::Command;

/// One `<attribution> <verb-phrase> <target>` template.
struct Template {
    verb: &'static str,
    pattern: Regex,
}

/// Verb phrases in priority order. The first template that matches wins and
/// later ones are never tried, so reordering this list changes behaviour.
const TEMPLATE_VERBS: [&str; 5] = ["recommends", "suggested", "said to watch", "likes", "liked"];

static TEMPLATES: Lazy<Vec<Template>> = Lazy::new(|| {
    TEMPLATE_VERBS
        .iter()
        .map(|&verb| Template {
            verb,
            pattern: Regex::new(&format!("(?is)^(.+) {} (.+)$", regex::escape(verb)))
                .expect("template pattern is a valid regex"),
        })
        .collect()
});

static ADD_FALLBACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\badd\s+(.+)$").expect("add pattern is a valid regex"));

static FILLER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)the movie|to my watchlist").expect("filler pattern is a valid regex")
});

/// Which rule produced a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPath {
    /// A verb-phrase template matched.
    Template(&'static str),
    /// The generic `add <target>` rule matched.
    AddFallback,
    /// Nothing matched.
    Unmatched,
}

impl ExtractionPath {
    /// Label used in telemetry.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Template(verb) => verb,
            Self::AddFallback => "add",
            Self::Unmatched => "none",
        }
    }
}

/// Pattern-cascade extractor turning an utterance into a [`Command`].
///
/// Stateless; one instance can be shared by every caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExtractor;

impl CommandExtractor {
    /// Creates an extractor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Extracts a command. Never fails: no match yields an invalid command.
    #[must_use]
    pub fn extract(&self, utterance: &str) -> Command {
        self.extract_traced(utterance).0
    }

    /// Extracts a command and reports which rule produced it.
    #[must_use]
    pub fn extract_traced(&self, utterance: &str) -> (Command, ExtractionPath) {
        for template in TEMPLATES.iter() {
            if let Some(caps) = template.pattern.captures(utterance) {
                let attribution = caps
                    .get(1)
                    .map(|m| m.as_str().trim())
                    .filter(|name| !name.is_empty())
                    .map(str::to_string);
                let target = caps.get(2).and_then(|m| cleaned(m.as_str()));
                return (
                    Command::new(utterance, attribution, target),
                    ExtractionPath::Template(template.verb),
                );
            }
        }

        if let Some(caps) = ADD_FALLBACK.captures(utterance) {
            let target = caps.get(1).and_then(|m| cleaned(m.as_str()));
            return (
                Command::new(utterance, None, target),
                ExtractionPath::AddFallback,
            );
        }

        (Command::unparsed(utterance), ExtractionPath::Unmatched)
    }
}

/// Strips "the movie" / "to my watchlist" anywhere (case-insensitive) and trims.
///
/// Runs to a fixed point so that cleaning a cleaned string is a no-op.
#[must_use]
pub fn cleanup_target(target: &str) -> String {
    let mut current = target.to_string();
    loop {
        let next = FILLER.replace_all(&current, "").trim().to_string();
        if next == current {
            return next;
        }
        current = next;
    }
}

fn cleaned(raw: &str) -> Option<String> {
    let target = cleanup_target(raw);
    (!target.is_empty()).then_some(target)
}
