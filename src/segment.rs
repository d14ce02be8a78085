//! Marketing segments derived from recency and frequency scores

use crate::score::RfScore;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Named customer segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Hibernating,
    AtRisk,
    CantLoose,
    AboutToSleep,
    NeedAttention,
    LoyalCustomers,
    Promising,
    NewCustomers,
    PotentialLoyalists,
    Champions,
}

impl Segment {
    pub const ALL: [Segment; 10] = [
        Segment::Hibernating,
        Segment::AtRisk,
        Segment::CantLoose,
        Segment::AboutToSleep,
        Segment::NeedAttention,
        Segment::LoyalCustomers,
        Segment::Promising,
        Segment::NewCustomers,
        Segment::PotentialLoyalists,
        Segment::Champions,
    ];

    /// snake_case label used in reports and exports
    pub fn label(self) -> &'static str {
        match self {
            Segment::Hibernating => "hibernating",
            Segment::AtRisk => "at_risk",
            Segment::CantLoose => "cant_loose",
            Segment::AboutToSleep => "about_to_sleep",
            Segment::NeedAttention => "need_attention",
            Segment::LoyalCustomers => "loyal_customers",
            Segment::Promising => "promising",
            Segment::NewCustomers => "new_customers",
            Segment::PotentialLoyalists => "potential_loyalists",
            Segment::Champions => "champions",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Segment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Segment::ALL
            .into_iter()
            .find(|segment| segment.label() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Segment::ALL.iter().map(|s| s.label()).collect();
                format!("Unknown segment '{}', expected one of: {}", s, known.join(", "))
            })
    }
}

/// A recency/frequency score window mapped to a segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRule {
    pub recency: RangeInclusive<u8>,
    pub frequency: RangeInclusive<u8>,
    pub segment: Segment,
}

impl SegmentRule {
    pub fn matches(&self, rf: RfScore) -> bool {
        self.recency.contains(&rf.recency.value()) && self.frequency.contains(&rf.frequency.value())
    }
}

/// Classification rules in priority order; the first match wins.
pub const SEGMENT_RULES: [SegmentRule; 10] = [
    SegmentRule { recency: 1..=2, frequency: 1..=2, segment: Segment::Hibernating },
    SegmentRule { recency: 1..=2, frequency: 3..=4, segment: Segment::AtRisk },
    SegmentRule { recency: 1..=2, frequency: 5..=5, segment: Segment::CantLoose },
    SegmentRule { recency: 3..=3, frequency: 1..=2, segment: Segment::AboutToSleep },
    SegmentRule { recency: 3..=3, frequency: 3..=3, segment: Segment::NeedAttention },
    SegmentRule { recency: 3..=4, frequency: 4..=5, segment: Segment::LoyalCustomers },
    SegmentRule { recency: 4..=4, frequency: 1..=1, segment: Segment::Promising },
    SegmentRule { recency: 5..=5, frequency: 1..=1, segment: Segment::NewCustomers },
    SegmentRule { recency: 4..=5, frequency: 2..=3, segment: Segment::PotentialLoyalists },
    SegmentRule { recency: 5..=5, frequency: 4..=5, segment: Segment::Champions },
];

/// Segment for an RF score, or `None` if no rule covers it
pub fn classify(rf: RfScore) -> Option<Segment> {
    SEGMENT_RULES
        .iter()
        .find(|rule| rule.matches(rf))
        .map(|rule| rule.segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::Score;

    fn rf(recency: u8, frequency: u8) -> RfScore {
        RfScore {
            recency: Score::new(recency).unwrap(),
            frequency: Score::new(frequency).unwrap(),
        }
    }

    #[test]
    fn test_every_score_pair_has_exactly_one_rule() {
        for recency in Score::all() {
            for frequency in Score::all() {
                let score = RfScore { recency, frequency };
                let matching = SEGMENT_RULES.iter().filter(|rule| rule.matches(score)).count();
                assert_eq!(matching, 1, "rf score {} matched {} rules", score, matching);
                assert!(classify(score).is_some());
            }
        }
    }

    #[test]
    fn test_reference_assignments() {
        assert_eq!(classify(rf(5, 4)), Some(Segment::Champions));
        assert_eq!(classify(rf(3, 3)), Some(Segment::NeedAttention));
        assert_eq!(classify(rf(3, 4)), Some(Segment::LoyalCustomers));
        assert_eq!(classify(rf(4, 1)), Some(Segment::Promising));
        assert_eq!(classify(rf(5, 1)), Some(Segment::NewCustomers));
        assert_eq!(classify(rf(2, 5)), Some(Segment::CantLoose));
        assert_eq!(classify(rf(1, 3)), Some(Segment::AtRisk));
        assert_eq!(classify(rf(1, 1)), Some(Segment::Hibernating));
        assert_eq!(classify(rf(3, 2)), Some(Segment::AboutToSleep));
        assert_eq!(classify(rf(4, 3)), Some(Segment::PotentialLoyalists));
    }

    #[test]
    fn test_every_segment_is_reachable() {
        for segment in Segment::ALL {
            assert!(
                SEGMENT_RULES.iter().any(|rule| rule.segment == segment),
                "{} has no rule",
                segment
            );
        }
    }

    #[test]
    fn test_parse_segment() {
        assert_eq!("loyal_customers".parse::<Segment>(), Ok(Segment::LoyalCustomers));
        assert_eq!("Cant-Loose".parse::<Segment>(), Ok(Segment::CantLoose));
        assert!("vip".parse::<Segment>().is_err());
        for segment in Segment::ALL {
            assert_eq!(segment.label().parse::<Segment>(), Ok(segment));
        }
    }
}
