use crate::DEFAULT_LIMIT;
use crate::Elo;
use crate::Error;
use crate::MAX_LIMIT;
use crate::openings::Catalogue;
use crate::openings::normalize;
use crate::search::Plan;
use crate::search::PlanFilter;
use crate::search::RatingFilter;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

const NUMERALS: &[(&str, usize)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
    ("fifteen", 15),
    ("sixteen", 16),
    ("seventeen", 17),
    ("eighteen", 18),
    ("nineteen", 19),
    ("twenty", 20),
];

const VERBS: &[&str] = &["find", "show", "top", "give", "list"];

const CONNECTIVES: &[&str] = &[
    "is", "are", "was", "at", "least", "over", "above", "rated", "rating",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "best", "black", "both", "by", "elo", "find", "for", "from", "game",
    "games", "give", "higher", "in", "is", "least", "list", "lower", "me", "of", "or", "over",
    "played", "please", "point", "points", "rated", "rating", "results", "show", "that", "the",
    "to", "top", "was", "where", "which", "white", "with", "within",
];

const PHASES: &[&str] = &["opening", "middlegame", "endgame"];

#[rustfmt::skip]
const THEMES: &[(&str, &str)] = &[
    ("sacrifice",          "sacrifice"),
    ("exchange sacrifice", "exchange_sacrifice"),
    ("king attack",        "king_attack"),
    ("kingside attack",    "king_attack"),
    ("attack on the king", "king_attack"),
    ("queenside majority", "queenside_majority"),
    ("passed pawn",        "passed_pawn"),
    ("pawn storm",         "pawn_storm"),
    ("isolated pawn",      "isolated_pawn"),
    ("zugzwang",           "zugzwang"),
    ("fortress",           "fortress"),
];

/// Deterministic natural-language question parser. No external calls: the
/// same question always produces the same plan.
pub struct Analyzer {
    catalogue: Catalogue,
}

impl Analyzer {
    pub fn new(catalogue: Catalogue) -> Self {
        Self { catalogue }
    }

    pub fn analyse(&self, text: &str) -> Result<Plan, Error> {
        let folded = text.nfkc().collect::<String>();
        let cleaned = normalize(&folded);
        if cleaned.is_empty() {
            return Err(Error::BadInput("empty question".to_string()));
        }
        let tokens = cleaned
            .split(' ')
            .map(str::to_string)
            .collect::<Vec<String>>();
        let mut filters = Vec::new();
        let mut consumed = HashSet::<String>::new();
        for hit in self.catalogue.filters_for_text(&cleaned) {
            filters.push(PlanFilter::new("opening", hit.slug));
            filters.push(PlanFilter::new("eco_range", hit.eco_range()));
            if let Some(opening) = self.catalogue.by_slug(hit.slug) {
                for source in opening
                    .synonyms
                    .iter()
                    .chain(std::iter::once(&opening.name))
                {
                    consumed.extend(normalize(source).split(' ').map(str::to_string));
                }
            }
        }
        let padded = format!(" {cleaned} ");
        for phase in PHASES {
            if padded.contains(&format!(" {phase} ")) {
                filters.push(PlanFilter::new("phase", *phase));
                consumed.insert((*phase).to_string());
            }
        }
        for (needle, value) in THEMES {
            if padded.contains(&format!(" {needle} ")) {
                filters.push(PlanFilter::new("theme", *value));
                consumed.extend(needle.split(' ').map(str::to_string));
            }
        }
        Ok(Plan {
            limit: extract_limit(&tokens),
            rating: extract_rating(&tokens),
            keywords: residue(&tokens, &consumed),
            filters,
            cleaned_text: cleaned,
        })
    }
}

/// `find/show/top/give N (games|results)`, digits or english numerals;
/// zero means unspecified, anything above the ceiling clamps to it
fn extract_limit(tokens: &[String]) -> usize {
    for (i, token) in tokens.iter().enumerate() {
        if !VERBS.contains(&token.as_str()) {
            continue;
        }
        for next in tokens.iter().skip(i + 1).take(2) {
            if let Some(n) = parse_count(next) {
                return match n {
                    0 => DEFAULT_LIMIT,
                    n => n.min(MAX_LIMIT),
                };
            }
            if !matches!(next.as_str(), "me" | "the" | "best") {
                break;
            }
        }
    }
    DEFAULT_LIMIT
}

fn extract_rating(tokens: &[String]) -> RatingFilter {
    let mut rating = RatingFilter::default();
    for (i, token) in tokens.iter().enumerate() {
        if token == "within" {
            for next in tokens.iter().skip(i + 1).take(2) {
                if let Some(n) = parse_number(next) {
                    rating.max_rating_delta = Some(n);
                    break;
                }
            }
        }
        // "N points lower" / "N elo higher"
        if let Some(n) = parse_number(token) {
            let unit = tokens.get(i + 1).map(String::as_str);
            let direction = tokens.get(i + 2).map(String::as_str);
            if matches!(unit, Some("points" | "point" | "elo"))
                && matches!(direction, Some("lower" | "higher"))
            {
                rating.max_rating_delta = Some(n);
            }
        }
    }
    for (i, token) in tokens.iter().enumerate() {
        let subject = match token.as_str() {
            "white" | "black" | "both" => token.as_str(),
            _ => continue,
        };
        let mut min = None;
        for j in (i + 1)..tokens.len().min(i + 6) {
            let next = &tokens[j];
            if matches!(next.as_str(), "within" | "white" | "black" | "both") {
                break;
            }
            if let Some(n) = parse_number(next) {
                let unit = tokens.get(j + 1).map(String::as_str);
                let direction = tokens.get(j + 2).map(String::as_str);
                // "200 points lower" bounds the gap, not the rating
                if matches!(unit, Some("points" | "point" | "elo"))
                    && matches!(direction, Some("lower" | "higher"))
                {
                    break;
                }
                min = Some(n);
                break;
            }
            if !CONNECTIVES.contains(&next.as_str()) {
                break;
            }
        }
        if let Some(n) = min {
            match subject {
                "white" => rating.white_min = Some(n),
                "black" => rating.black_min = Some(n),
                _ => {
                    rating.white_min = Some(n);
                    rating.black_min = Some(n);
                }
            }
        }
    }
    rating
}

fn residue(tokens: &[String], consumed: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .iter()
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .filter(|t| parse_count(t).is_none())
        .filter(|t| !consumed.contains(t.as_str()))
        .filter(|t| seen.insert(t.to_string()))
        .cloned()
        .collect()
}

fn parse_count(token: &str) -> Option<usize> {
    token.parse::<usize>().ok().or_else(|| {
        NUMERALS
            .iter()
            .find(|(word, _)| *word == token)
            .map(|(_, n)| *n)
    })
}

fn parse_number(token: &str) -> Option<Elo> {
    token.parse::<Elo>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> Analyzer {
        Analyzer::new(Catalogue::default())
    }

    #[test]
    fn parses_the_kings_indian_question() {
        let plan = analyzer()
            .analyse("Find 3 King's Indian games where white is 2500 and black within 100 points")
            .unwrap();
        assert_eq!(plan.limit, 3);
        assert!(
            plan.filters
                .contains(&PlanFilter::new("opening", "kings_indian_defense"))
        );
        assert!(
            plan.filters
                .contains(&PlanFilter::new("eco_range", "E60-E99"))
        );
        assert_eq!(plan.rating.white_min, Some(2500));
        assert_eq!(plan.rating.black_min, None);
        assert_eq!(plan.rating.max_rating_delta, Some(100));
    }

    #[test]
    fn limit_defaults_and_clamps() {
        let analyzer = analyzer();
        assert_eq!(analyzer.analyse("sicilian games").unwrap().limit, 5);
        assert_eq!(analyzer.analyse("find 0 games").unwrap().limit, 5);
        assert_eq!(analyzer.analyse("show 9999 results").unwrap().limit, 50);
        assert_eq!(analyzer.analyse("give me ten games").unwrap().limit, 10);
        assert_eq!(analyzer.analyse("top twelve dragon games").unwrap().limit, 12);
    }

    #[test]
    fn both_sets_both_minimums() {
        let plan = analyzer()
            .analyse("games where both are over 2600")
            .unwrap();
        assert_eq!(plan.rating.white_min, Some(2600));
        assert_eq!(plan.rating.black_min, Some(2600));
    }

    #[test]
    fn delta_from_lower_higher_phrasing() {
        let plan = analyzer()
            .analyse("games where black is 200 points lower")
            .unwrap();
        assert_eq!(plan.rating.max_rating_delta, Some(200));
        assert_eq!(plan.rating.black_min, None);
    }

    #[test]
    fn phases_and_themes_become_filters() {
        let plan = analyzer()
            .analyse("endgame fortress studies with a passed pawn")
            .unwrap();
        assert!(plan.filters.contains(&PlanFilter::new("phase", "endgame")));
        assert!(plan.filters.contains(&PlanFilter::new("theme", "fortress")));
        assert!(
            plan.filters
                .contains(&PlanFilter::new("theme", "passed_pawn"))
        );
    }

    #[test]
    fn keywords_keep_order_and_dedupe() {
        let plan = analyzer()
            .analyse("brilliant attacking miniatures with brilliant tactics")
            .unwrap();
        assert_eq!(
            plan.keywords,
            vec!["brilliant", "attacking", "miniatures", "tactics"]
        );
    }

    #[test]
    fn empty_question_is_bad_input() {
        assert!(matches!(
            analyzer().analyse("  ?!  "),
            Err(Error::BadInput(_))
        ));
    }

    #[test]
    fn render_round_trips_filters_and_rating() {
        let plan = analyzer()
            .analyse("Find 3 King's Indian games where white is 2500 and black within 100 points")
            .unwrap();
        let again = analyzer().analyse(&plan.render()).unwrap();
        assert_eq!(again.limit, plan.limit);
        assert_eq!(again.filters, plan.filters);
        assert_eq!(again.rating, plan.rating);
    }
}
