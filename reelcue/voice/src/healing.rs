//! Decides whether a handled utterance looks like a misfire worth a second,
//! model-based interpretation. The decision is pure; acting on it lives in
//! [`crate::recovery`].

use serde::{Deserialize, Serialize};

use crate::command::{Command, HandlerOutcome, ScreenContext, UtteranceTicket};

/// Tokens signalling the user wanted to change watchlist state rather than search.
pub const ACTION_WORDS: &[&str] = &[
    "watch",
    "watched",
    "add",
    "mark",
    "remove",
    "delete",
    "move",
    "save",
    "rate",
    "actually",
    "didn't",
    "haven't",
    "unwatched",
    "seen",
];

/// Why an escalation fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// Search came back empty for an utterance containing action words.
    NoResultsWithActionWords,
    /// A bare title search was built from an utterance containing action words.
    ActionWordsInPlainSearch,
    /// Nothing was extracted from an utterance containing action words.
    ParseErrorWithActionWords,
}

/// Outcome of evaluating the trigger for one ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfHealingDecision {
    /// Whether to escalate.
    pub escalate: bool,
    /// Every rule that fired, in evaluation order.
    pub reasons: Vec<EscalationReason>,
    /// Action words found in the utterance.
    pub action_words: Vec<String>,
    /// Ticket the decision is about.
    pub ticket: UtteranceTicket,
    /// Observed outcome.
    pub outcome: HandlerOutcome,
    /// Screen hints supplied with the outcome.
    pub context: ScreenContext,
}

/// Action words present in `utterance`, matched as whole lowercase words.
#[must_use]
pub fn action_words_in(utterance: &str) -> Vec<String> {
    let folded = utterance.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'");
    let mut found: Vec<String> = Vec::new();
    for word in folded.split(|c: char| !(c.is_alphanumeric() || c == '\'')) {
        let word = word.trim_matches('\'');
        if ACTION_WORDS.contains(&word) && !found.iter().any(|seen| seen == word) {
            found.push(word.to_string());
        }
    }
    found
}

/// Rules that fire for the given inputs.
#[must_use]
pub fn escalation_reasons(
    utterance: &str,
    command: &Command,
    outcome: HandlerOutcome,
) -> Vec<EscalationReason> {
    if action_words_in(utterance).is_empty() {
        return Vec::new();
    }
    let mut reasons = Vec::new();
    if outcome == HandlerOutcome::NoResults {
        reasons.push(EscalationReason::NoResultsWithActionWords);
    }
    if command.is_plain_search() {
        reasons.push(EscalationReason::ActionWordsInPlainSearch);
    }
    if outcome == HandlerOutcome::ParseError {
        reasons.push(EscalationReason::ParseErrorWithActionWords);
    }
    reasons
}

/// Whether the interaction looks like a misparse. Pure and total.
#[must_use]
pub fn should_escalate(utterance: &str, command: &Command, outcome: HandlerOutcome) -> bool {
    !escalation_reasons(utterance, command, outcome).is_empty()
}

/// Evaluates the trigger for a ticket. Non-voice tickets never escalate.
#[must_use]
pub fn evaluate(
    ticket: &UtteranceTicket,
    outcome: HandlerOutcome,
    context: ScreenContext,
) -> SelfHealingDecision {
    let reasons = if ticket.source.escalation_eligible() {
        escalation_reasons(&ticket.utterance, &ticket.command, outcome)
    } else {
        Vec::new()
    };
    SelfHealingDecision {
        escalate: !reasons.is_empty(),
        reasons,
        action_words: action_words_in(&ticket.utterance),
        ticket: ticket.clone(),
        outcome,
        context,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{command::UtteranceSource, extractor::CommandExtractor};

    fn command_for(utterance: &str) -> Command {
        CommandExtractor::new().extract(utterance)
    }

    #[test]
    fn parse_error_with_action_word_escalates() {
        let utterance = "actually I watched this already";
        let command = command_for(utterance);
        assert!(!command.is_valid());
        assert!(should_escalate(utterance, &command, HandlerOutcome::ParseError));
    }

    #[test]
    fn clean_title_search_does_not_escalate() {
        let command = Command::new("Jurassic Park", None, Some("Jurassic Park".into()));
        assert!(!should_escalate("Jurassic Park", &command, HandlerOutcome::Success));
        assert!(!should_escalate("Jurassic Park", &command, HandlerOutcome::NoResults));
    }

    #[test]
    fn no_results_with_action_word_escalates() {
        let utterance = "Sally said to watch Dune";
        let command = command_for(utterance);
        assert_eq!(
            escalation_reasons(utterance, &command, HandlerOutcome::NoResults),
            vec![EscalationReason::NoResultsWithActionWords]
        );
        assert!(!should_escalate(utterance, &command, HandlerOutcome::Success));
    }

    #[test]
    fn plain_search_with_action_word_escalates_even_on_success() {
        let utterance = "add Heat";
        let command = command_for(utterance);
        assert_eq!(
            escalation_reasons(utterance, &command, HandlerOutcome::Success),
            vec![EscalationReason::ActionWordsInPlainSearch]
        );
    }

    #[test]
    fn parse_error_without_action_word_does_not_escalate() {
        let command = Command::unparsed("hmm what");
        assert!(!should_escalate("hmm what", &command, HandlerOutcome::ParseError));
    }

    #[test]
    fn action_words_match_whole_words_only() {
        assert!(action_words_in("my address is on the watchtower").is_empty());
        assert_eq!(action_words_in("I haven’t SEEN it, haven't seen"), vec!["haven't", "seen"]);
        assert_eq!(action_words_in("Remove... Jaws!"), vec!["remove"]);
    }

    #[test]
    fn typed_tickets_never_escalate() {
        let command = Command::unparsed("remove it");
        let ticket = UtteranceTicket::issue(UtteranceSource::Typed, "remove it", command);
        let decision = evaluate(&ticket, HandlerOutcome::ParseError, ScreenContext::default());
        assert!(!decision.escalate);
        assert!(decision.reasons.is_empty());
        assert_eq!(decision.action_words, vec!["remove"]);
    }

    #[test]
    fn voice_ticket_decision_carries_payload() {
        let utterance = "mark Alien as watched";
        let ticket = UtteranceTicket::issue(UtteranceSource::Voice, utterance, command_for(utterance));
        let context = ScreenContext::on_screen("watchlist").with_movie("Alien");
        let decision = evaluate(&ticket, HandlerOutcome::ParseError, context.clone());
        assert!(decision.escalate);
        assert_eq!(decision.context, context);
        assert_eq!(decision.ticket.id, ticket.id);
        assert_eq!(decision.action_words, vec!["mark", "watched"]);
    }
}
