//! Transcript reconciliation
//!
//! Finalized chunks are joined with single spaces. A trailing interim (the best
//! interim when present, otherwise the latest) is then folded in:
//! - dropped when its words already appear, in order, inside the finalized text,
//!   in which case the latest interim gets the same treatment
//! - merged without repeating the longest run where the finalized text ends the
//!   way the interim begins
//! - otherwise appended whole as a trailing segment
//!
//! Words are compared case- and punctuation-insensitively; the output keeps the
//! original spelling of both sides.

/// Build the session transcript from accumulated results
pub fn reconcile(finalized: &[String], latest_interim: &str, best_interim: &str) -> String {
    let joined = finalized
        .iter()
        .map(|chunk| chunk.trim())
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if joined.is_empty() {
        return trailing_candidates(latest_interim, best_interim)
            .next()
            .unwrap_or_default()
            .to_string();
    }

    let base_words: Vec<String> = joined.split_whitespace().map(normalize).collect();

    // A best interim the finals already cover must not hide newer pending speech
    for trailing in trailing_candidates(latest_interim, best_interim) {
        let tail_raw: Vec<&str> = trailing.split_whitespace().collect();
        let tail_words: Vec<String> = tail_raw.iter().map(|w| normalize(w)).collect();
        if contains_run(&base_words, &tail_words) {
            continue;
        }
        return merge_trailing(&joined, &base_words, &tail_raw, &tail_words);
    }

    joined
}

/// Best interim first when present; it carries the most speech
fn trailing_candidates<'a>(latest: &'a str, best: &'a str) -> impl Iterator<Item = &'a str> {
    let best = best.trim();
    let latest = latest.trim();
    let fallback = (latest != best).then_some(latest);
    std::iter::once(best)
        .chain(fallback)
        .filter(|text| !text.is_empty())
}

fn normalize(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric() || *c == '\'')
        .flat_map(char::to_lowercase)
        .collect()
}

fn merge_trailing(
    base: &str,
    base_words: &[String],
    tail_raw: &[&str],
    tail_words: &[String],
) -> String {
    let overlap = suffix_prefix_overlap(base_words, tail_words);
    let rest = tail_raw[overlap..].join(" ");
    if rest.is_empty() {
        return base.to_string();
    }

    format!("{} {}", base, rest)
}

/// True when `needle` occurs as a contiguous run inside `haystack`
fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Longest k where the last k words of `base` equal the first k words of `tail`
fn suffix_prefix_overlap(base: &[String], tail: &[String]) -> usize {
    let max = base.len().min(tail.len());
    (1..=max)
        .rev()
        .find(|&k| base[base.len() - k..] == tail[..k])
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_overlapping_interim_is_not_duplicated() {
        let finalized = chunks(&["Tell me about", "a challenge you"]);
        let transcript = reconcile(&finalized, "", "a challenge you faced at work");
        assert_eq!(transcript, "Tell me about a challenge you faced at work");
    }

    #[test]
    fn test_reworded_interim_is_appended_as_trailing_segment() {
        let finalized = chunks(&["Tell me about", "a challenge you"]);
        let transcript = reconcile(&finalized, "", "the challenge we faced at work");
        assert_eq!(
            transcript,
            "Tell me about a challenge you the challenge we faced at work"
        );
    }

    #[test]
    fn test_interim_already_finalized_is_dropped() {
        let finalized = chunks(&["I led the migration.", "It took three months."]);
        let transcript = reconcile(&finalized, "", "i led the migration");
        assert_eq!(transcript, "I led the migration. It took three months.");
    }

    #[test]
    fn test_best_interim_preferred_over_latest() {
        let finalized = chunks(&["So"]);
        let transcript = reconcile(&finalized, "we shipped", "we shipped it on time");
        assert_eq!(transcript, "So we shipped it on time");
    }

    #[test]
    fn test_pending_interim_survives_covered_best() {
        let finalized = chunks(&["I led the whole migration project."]);
        let transcript = reconcile(
            &finalized,
            "and it took",
            "I led the whole migration project",
        );
        assert_eq!(transcript, "I led the whole migration project. and it took");
    }

    #[test]
    fn test_latest_used_when_no_best() {
        let transcript = reconcile(&[], "partial answer", "");
        assert_eq!(transcript, "partial answer");
    }

    #[test]
    fn test_only_finalized() {
        let finalized = chunks(&["  first  ", "", "second"]);
        assert_eq!(reconcile(&finalized, "  ", ""), "first second");
    }

    #[test]
    fn test_nothing_recognized() {
        assert_eq!(reconcile(&[], "", ""), "");
    }

    #[test]
    fn test_overlap_ignores_case_and_punctuation() {
        let finalized = chunks(&["My biggest strength is Communication."]);
        let transcript = reconcile(&finalized, "", "communication, and empathy");
        assert_eq!(
            transcript,
            "My biggest strength is Communication. and empathy"
        );
    }
}
