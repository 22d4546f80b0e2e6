//! Query topic inference from cited sections and keyword stems.
//!
//! Each cited statute in a topic's table, each regulation in a topic's
//! number range, and each keyword stem found in the query adds one point to
//! that topic. A topic is reported only with at least two points; one weak
//! signal is not enough to boost a whole topic.

use super::citation::{Citation, CitationKind};
use std::collections::BTreeMap;

pub const CONFLICTS_OF_INTEREST: &str = "conflicts_of_interest";
pub const CAMPAIGN_FINANCE: &str = "campaign_finance";
pub const GIFTS_HONORARIA: &str = "gifts_honoraria";
pub const LOBBYING: &str = "lobbying";

const MIN_TOPIC_POINTS: u32 = 2;

#[rustfmt::skip]
const STATUTE_TOPICS: &[(&str, &[&str])] = &[
    (CONFLICTS_OF_INTEREST, &[
        "87100", "87101", "87102", "87103", "87104", "87105",
        "87200", "87201", "87202", "87203", "87206", "87207",
        "87300", "87301", "87302", "87302.3", "87302.6",
        "87400", "87450",
        "1090", "1091", "1092", "1093", "1094", "1095", "1096", "1097",
    ]),
    (CAMPAIGN_FINANCE, &[
        "82015", "84200", "84201", "84202", "84203", "84204",
        "84211", "84300", "84301", "84302",
        "85100", "85101", "85200", "85201", "85300", "85301",
        "85302", "85303", "85304", "85305", "85306",
        "85500", "85601", "85700", "85800",
    ]),
    (GIFTS_HONORARIA, &[
        "89501", "89502", "89503", "89506",
        "86201", "86202", "86203", "86204", "86205",
    ]),
    (LOBBYING, &[
        "86100", "86101", "86102", "86103", "86104", "86105",
        "86110", "86112", "86113", "86114", "86115", "86116",
    ]),
];

const REGULATION_RANGES: &[(u32, u32, &str)] = &[
    (18700, 18707, CONFLICTS_OF_INTEREST),
    (18215, 18225, CAMPAIGN_FINANCE),
    (18730, 18735, GIFTS_HONORARIA),
    (18610, 18618, LOBBYING),
];

#[rustfmt::skip]
const KEYWORD_TOPICS: &[(&str, &[&str])] = &[
    (CONFLICTS_OF_INTEREST, &[
        "disqualif", "recus", "conflict", "1090", "self-deal",
        "financial interest", "abstain",
    ]),
    (CAMPAIGN_FINANCE, &[
        "contribution", "campaign", "expenditure", "donor", "committee", "election",
    ]),
    (GIFTS_HONORARIA, &["gift", "honorari", "travel payment", "behest"]),
    (LOBBYING, &["lobbying", "lobbyist", "lobbied"]),
];

/// Infers the query's topic label, if the evidence is strong enough.
pub fn infer_topic(query: &str, citations: &[Citation]) -> Option<&'static str> {
    let mut points: BTreeMap<&'static str, u32> = BTreeMap::new();

    for c in citations {
        match c.kind {
            CitationKind::Statute => {
                for (topic, statutes) in STATUTE_TOPICS {
                    if statutes.iter().any(|s| *s == c.base) {
                        *points.entry(*topic).or_insert(0) += 1;
                    }
                }
            }
            CitationKind::Regulation => {
                let number: u32 = c.base.parse().unwrap_or(0);
                if let Some((_, _, topic)) = REGULATION_RANGES
                    .iter()
                    .find(|(lo, hi, _)| (*lo..=*hi).contains(&number))
                {
                    *points.entry(*topic).or_insert(0) += 1;
                }
            }
        }
    }

    let lowered = query.to_lowercase();
    for (topic, stems) in KEYWORD_TOPICS {
        let hits = stems.iter().filter(|s| lowered.contains(**s)).count() as u32;
        if hits > 0 {
            *points.entry(*topic).or_insert(0) += hits;
        }
    }

    // First topic in table order wins a tie.
    let order = |t: &str| STATUTE_TOPICS.iter().position(|(name, _)| *name == t);
    points
        .into_iter()
        .filter(|(_, p)| *p >= MIN_TOPIC_POINTS)
        .max_by(|(ta, pa), (tb, pb)| pa.cmp(pb).then_with(|| order(*tb).cmp(&order(*ta))))
        .map(|(topic, _)| topic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::citation::parse_citations;

    fn infer(query: &str) -> Option<&'static str> {
        infer_topic(query, &parse_citations(query))
    }

    #[test]
    fn test_statute_plus_keyword() {
        assert_eq!(
            infer("Section 87103 disqualification of a council member"),
            Some(CONFLICTS_OF_INTEREST)
        );
    }

    #[test]
    fn test_single_signal_is_not_enough() {
        assert_eq!(infer("travel for a board member"), None);
        assert_eq!(infer("gift"), None);
    }

    #[test]
    fn test_regulation_range() {
        assert_eq!(
            infer("Regulation 18730 gift reporting"),
            Some(GIFTS_HONORARIA)
        );
    }

    #[test]
    fn test_keywords_alone() {
        assert_eq!(
            infer("lobbyist contacts while lobbying the agency"),
            Some(LOBBYING)
        );
    }

    #[test]
    fn test_tie_prefers_table_order() {
        // two points each for campaign finance and gifts
        assert_eq!(
            infer("campaign contribution or a gift with a behest"),
            Some(CAMPAIGN_FINANCE)
        );
    }
}
