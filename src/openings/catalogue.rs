/// One opening family: canonical slug, display name, lowercase synonyms,
/// and an inclusive ECO range.
#[derive(Debug, Clone, Copy)]
pub struct Opening {
    pub slug: &'static str,
    pub name: &'static str,
    pub synonyms: &'static [&'static str],
    pub eco: (&'static str, &'static str),
}

/// A match against the catalogue, usable as a metadata filter pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpeningFilter {
    pub slug: &'static str,
    pub eco_min: &'static str,
    pub eco_max: &'static str,
}

impl OpeningFilter {
    pub fn eco_range(&self) -> String {
        format!("{}-{}", self.eco_min, self.eco_max)
    }
}

#[rustfmt::skip]
static OPENINGS: &[Opening] = &[
    Opening { slug: "kings_indian_defense",   name: "King's Indian Defense",   synonyms: &["king's indian", "kings indian", "kid"],                    eco: ("E60", "E99") },
    Opening { slug: "nimzo_indian_defense",   name: "Nimzo-Indian Defense",    synonyms: &["nimzo indian", "nimzo"],                                   eco: ("E20", "E59") },
    Opening { slug: "queens_indian_defense",  name: "Queen's Indian Defense",  synonyms: &["queen's indian", "queens indian"],                         eco: ("E12", "E19") },
    Opening { slug: "catalan_opening",        name: "Catalan Opening",         synonyms: &["catalan"],                                                 eco: ("E01", "E09") },
    Opening { slug: "grunfeld_defense",       name: "Grünfeld Defense",        synonyms: &["grunfeld", "gruenfeld"],                                   eco: ("D70", "D99") },
    Opening { slug: "queens_gambit_declined", name: "Queen's Gambit Declined", synonyms: &["queen's gambit declined", "queens gambit declined", "qgd"], eco: ("D30", "D69") },
    Opening { slug: "queens_gambit_accepted", name: "Queen's Gambit Accepted", synonyms: &["queen's gambit accepted", "queens gambit accepted", "qga"], eco: ("D20", "D29") },
    Opening { slug: "queens_gambit",          name: "Queen's Gambit",          synonyms: &["queen's gambit", "queens gambit"],                         eco: ("D06", "D69") },
    Opening { slug: "slav_defense",           name: "Slav Defense",            synonyms: &["slav"],                                                    eco: ("D10", "D19") },
    Opening { slug: "london_system",          name: "London System",           synonyms: &["london system", "london"],                                 eco: ("D02", "D02") },
    Opening { slug: "najdorf_variation",      name: "Najdorf Variation",       synonyms: &["najdorf"],                                                 eco: ("B90", "B99") },
    Opening { slug: "sicilian_dragon",        name: "Sicilian Dragon",         synonyms: &["dragon"],                                                  eco: ("B70", "B79") },
    Opening { slug: "sveshnikov_variation",   name: "Sveshnikov Variation",    synonyms: &["sveshnikov"],                                              eco: ("B33", "B33") },
    Opening { slug: "sicilian_defense",       name: "Sicilian Defense",        synonyms: &["sicilian"],                                                eco: ("B20", "B99") },
    Opening { slug: "caro_kann_defense",      name: "Caro-Kann Defense",       synonyms: &["caro kann", "caro-kann"],                                  eco: ("B10", "B19") },
    Opening { slug: "pirc_defense",           name: "Pirc Defense",            synonyms: &["pirc"],                                                    eco: ("B07", "B09") },
    Opening { slug: "alekhine_defense",       name: "Alekhine Defense",        synonyms: &["alekhine", "alekhine's defense"],                          eco: ("B02", "B05") },
    Opening { slug: "scandinavian_defense",   name: "Scandinavian Defense",    synonyms: &["scandinavian", "center counter"],                          eco: ("B01", "B01") },
    Opening { slug: "ruy_lopez",              name: "Ruy Lopez",               synonyms: &["ruy lopez", "spanish game", "spanish opening"],            eco: ("C60", "C99") },
    Opening { slug: "italian_game",           name: "Italian Game",            synonyms: &["italian game", "giuoco piano"],                            eco: ("C50", "C54") },
    Opening { slug: "scotch_game",            name: "Scotch Game",             synonyms: &["scotch"],                                                  eco: ("C44", "C45") },
    Opening { slug: "kings_gambit",           name: "King's Gambit",           synonyms: &["king's gambit", "kings gambit"],                           eco: ("C30", "C39") },
    Opening { slug: "vienna_game",            name: "Vienna Game",             synonyms: &["vienna"],                                                  eco: ("C25", "C29") },
    Opening { slug: "french_defense",         name: "French Defense",          synonyms: &["french"],                                                  eco: ("C00", "C19") },
    Opening { slug: "dutch_defense",          name: "Dutch Defense",           synonyms: &["dutch"],                                                   eco: ("A80", "A99") },
    Opening { slug: "benoni_defense",         name: "Benoni Defense",          synonyms: &["benoni"],                                                  eco: ("A56", "A79") },
    Opening { slug: "english_opening",        name: "English Opening",         synonyms: &["english opening", "english"],                              eco: ("A10", "A39") },
    Opening { slug: "reti_opening",           name: "Réti Opening",            synonyms: &["reti"],                                                    eco: ("A04", "A09") },
];

/// Immutable opening taxonomy, built once at startup and passed through
/// context rather than hidden in module scope.
#[derive(Debug, Clone)]
pub struct Catalogue {
    entries: &'static [Opening],
}

impl Default for Catalogue {
    fn default() -> Self {
        Self { entries: OPENINGS }
    }
}

impl Catalogue {
    pub fn entries(&self) -> &'static [Opening] {
        self.entries
    }

    pub fn by_slug(&self, slug: &str) -> Option<&'static Opening> {
        self.entries.iter().find(|o| o.slug == slug)
    }

    /// most specific (narrowest ECO span) entry containing the code
    pub fn slug_for_eco(&self, code: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .filter(|o| o.eco.0 <= code && code <= o.eco.1)
            .min_by_key(|o| eco_span(o))
            .map(|o| o.slug)
    }

    /// every entry whose synonym list whole-word matches the text
    pub fn filters_for_text(&self, text: &str) -> Vec<OpeningFilter> {
        let haystack = format!(" {} ", normalize(text));
        self.entries
            .iter()
            .filter(|o| {
                o.synonyms
                    .iter()
                    .map(|s| normalize(s))
                    .chain(std::iter::once(normalize(o.name)))
                    .any(|needle| haystack.contains(&format!(" {needle} ")))
            })
            .map(|o| OpeningFilter {
                slug: o.slug,
                eco_min: o.eco.0,
                eco_max: o.eco.1,
            })
            .collect()
    }
}

fn eco_span(opening: &Opening) -> u32 {
    let ord = |code: &str| {
        let mut chars = code.chars();
        let letter = chars.next().unwrap_or('A') as u32;
        let digits = code[1..].parse::<u32>().unwrap_or(0);
        letter * 100 + digits
    };
    ord(opening.eco.1) - ord(opening.eco.0)
}

/// lowercase, drop apostrophes, replace other punctuation with spaces,
/// collapse whitespace
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for c in text.chars() {
        if c == '\'' || c == '’' {
            continue;
        }
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eco_lookup_prefers_narrowest_range() {
        let catalogue = Catalogue::default();
        assert_eq!(catalogue.slug_for_eco("B92"), Some("najdorf_variation"));
        assert_eq!(catalogue.slug_for_eco("B40"), Some("sicilian_defense"));
        assert_eq!(catalogue.slug_for_eco("E97"), Some("kings_indian_defense"));
        assert_eq!(catalogue.slug_for_eco("A45"), None);
    }

    #[test]
    fn text_match_is_whole_word() {
        let catalogue = Catalogue::default();
        let hits = catalogue.filters_for_text("a kidnapping story");
        assert!(hits.is_empty());
        let hits = catalogue.filters_for_text("best KID games");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "kings_indian_defense");
    }

    #[test]
    fn apostrophes_do_not_break_matching() {
        let catalogue = Catalogue::default();
        let hits = catalogue.filters_for_text("Find 3 King's Indian games");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "kings_indian_defense");
        assert_eq!(hits[0].eco_range(), "E60-E99");
    }

    #[test]
    fn multiple_synonym_hits_yield_multiple_filters() {
        let catalogue = Catalogue::default();
        let hits = catalogue.filters_for_text("najdorf sicilian middlegames");
        let slugs = hits.iter().map(|h| h.slug).collect::<Vec<_>>();
        assert!(slugs.contains(&"najdorf_variation"));
        assert!(slugs.contains(&"sicilian_defense"));
    }

    #[test]
    fn normalization_collapses_noise() {
        assert_eq!(normalize("  King's   Indian,  please!  "), "kings indian please");
    }
}
