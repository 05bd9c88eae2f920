use crate::Elo;
use serde::Deserialize;
use serde::Serialize;
use std::hash::Hasher;

/// One structured predicate extracted from the question. `field` is one of
/// `opening`, `eco_range`, `phase`, `theme`, `result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFilter {
    pub field: String,
    pub value: String,
}

impl PlanFilter {
    pub fn new(field: &str, value: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            value: value.into(),
        }
    }
}

/// Rating constraints extracted from the question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingFilter {
    pub white_min: Option<Elo>,
    pub black_min: Option<Elo>,
    pub max_rating_delta: Option<Elo>,
}

impl RatingFilter {
    pub fn is_empty(&self) -> bool {
        self.white_min.is_none() && self.black_min.is_none() && self.max_rating_delta.is_none()
    }
}

/// The structured query produced by the intent analyzer. Pure data: no
/// handles, no I/O, serializable into the HTTP response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub cleaned_text: String,
    pub limit: usize,
    pub filters: Vec<PlanFilter>,
    pub rating: RatingFilter,
    pub keywords: Vec<String>,
}

impl Plan {
    pub fn opening_slugs(&self) -> Vec<&str> {
        self.filters
            .iter()
            .filter(|f| f.field == "opening")
            .map(|f| f.value.as_str())
            .collect()
    }

    pub fn eco_ranges(&self) -> Vec<(&str, &str)> {
        self.filters
            .iter()
            .filter(|f| f.field == "eco_range")
            .filter_map(|f| f.value.split_once('-'))
            .collect()
    }

    /// Canonical text form. Feeding this back through the analyzer yields
    /// the same filters and rating constraints.
    pub fn render(&self) -> String {
        let mut out = format!("find {} ", self.limit);
        for slug in self.opening_slugs() {
            out.push_str(&slug.replace('_', " "));
            out.push(' ');
        }
        out.push_str("games");
        if let Some(white) = self.rating.white_min {
            out.push_str(&format!(" where white is {white}"));
        }
        if let Some(black) = self.rating.black_min {
            out.push_str(&format!(" where black is {black}"));
        }
        if let Some(delta) = self.rating.max_rating_delta {
            out.push_str(&format!(" within {delta} points"));
        }
        for filter in &self.filters {
            if filter.field == "phase" || filter.field == "theme" {
                out.push(' ');
                out.push_str(&filter.value.replace('_', " "));
            }
        }
        for keyword in &self.keywords {
            out.push(' ');
            out.push_str(keyword);
        }
        out
    }

    /// Stable fingerprint over the whole plan, used to key the agent cache.
    pub fn fingerprint(&self) -> String {
        let mut hasher = fnv::FnvHasher::default();
        let encoded = serde_json::to_string(self).unwrap_or_default();
        hasher.write(encoded.as_bytes());
        format!("{:016x}", hasher.finish())
    }
}

#[cfg(test)]
pub fn plan_for_tests() -> Plan {
    Plan {
        cleaned_text: "find sharp attacking games".to_string(),
        limit: 5,
        filters: vec![PlanFilter::new("opening", "kings_indian_defense")],
        rating: RatingFilter::default(),
        keywords: vec!["sharp".to_string(), "attacking".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let plan = Plan {
            cleaned_text: "find kings indian games".into(),
            limit: 5,
            filters: vec![PlanFilter::new("opening", "kings_indian_defense")],
            rating: RatingFilter::default(),
            keywords: vec!["attack".into()],
        };
        assert_eq!(plan.fingerprint(), plan.fingerprint());
        let mut other = plan.clone();
        other.limit = 6;
        assert_ne!(plan.fingerprint(), other.fingerprint());
    }

    #[test]
    fn eco_ranges_split() {
        let plan = Plan {
            cleaned_text: String::new(),
            limit: 5,
            filters: vec![PlanFilter::new("eco_range", "E60-E99")],
            rating: RatingFilter::default(),
            keywords: vec![],
        };
        assert_eq!(plan.eco_ranges(), vec![("E60", "E99")]);
    }
}
