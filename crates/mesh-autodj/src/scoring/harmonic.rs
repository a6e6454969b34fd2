//! Harmonic compatibility on the Camelot wheel

use super::{CriterionScore, NEUTRAL_SCORE};
use crate::music::{CamelotKey, KeyRelation};

const IDENTICAL_SCORE: u32 = 100;
const COMPATIBLE_SCORE: u32 = 80;
const CLASH_SCORE: u32 = 30;

pub fn score(reference: Option<CamelotKey>, candidate: Option<CamelotKey>) -> CriterionScore {
    let (Some(from), Some(to)) = (reference, candidate) else {
        return CriterionScore::new(NEUTRAL_SCORE, "Key data unavailable");
    };

    match from.relation(&to) {
        KeyRelation::Identical => {
            CriterionScore::new(IDENTICAL_SCORE, format!("Perfect match ({})", from))
        }
        KeyRelation::Adjacent => {
            CriterionScore::new(COMPATIBLE_SCORE, format!("Compatible ({} → {})", from, to))
        }
        KeyRelation::Relative => {
            CriterionScore::new(COMPATIBLE_SCORE, format!("Relative key ({} → {})", from, to))
        }
        KeyRelation::Clash => CriterionScore::new(CLASH_SCORE, format!("Key clash ({} → {})", from, to)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Option<CamelotKey> {
        CamelotKey::parse(s)
    }

    #[test]
    fn test_identical_keys_score_100() {
        for position in 1..=12 {
            for mode in ["A", "B"] {
                let k = key(&format!("{}{}", position, mode));
                assert_eq!(score(k, k).score, 100);
            }
        }
    }

    #[test]
    fn test_compatible_keys_score_80() {
        assert_eq!(score(key("8A"), key("9A")).score, 80);
        assert_eq!(score(key("1A"), key("12A")).score, 80);
        assert_eq!(score(key("8A"), key("8B")).score, 80);
        assert_eq!(score(key("8A"), key("8B")).reason, "Relative key (8A → 8B)");
    }

    #[test]
    fn test_clash_scores_30() {
        let result = score(key("8A"), key("3B"));
        assert_eq!(result.score, 30);
        assert_eq!(result.reason, "Key clash (8A → 3B)");
        assert_eq!(score(key("8A"), key("10A")).score, 30);
    }

    #[test]
    fn test_unknown_key_is_neutral() {
        assert_eq!(score(None, key("8A")).score, 50);
        assert_eq!(score(key("8A"), None).score, 50);
        assert_eq!(score(None, None).reason, "Key data unavailable");
    }
}
