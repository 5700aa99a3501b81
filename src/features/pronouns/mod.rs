//! # Feature: Pronoun Sets
//!
//! Parses the free-text pronoun strings users put in their profiles
//! ("She/her", "they/he", "xe/xem/xyr/xyrs/xemself") into grammatical tuples
//! that birthday messages can be conjugated with. Parsing is deliberately
//! lenient and never fails: unknown pronouns get they-style derived forms.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.3.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Precomputed token index replaces the linear catalog scan
//! - 1.0.0: Initial release with catalog lookup and custom-set synthesis

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// The five grammatical forms of a personal pronoun.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PronounSet {
    pub subjective: String,
    pub objective: String,
    pub determiner: String,
    pub possessive: String,
    pub reflexive: String,
}

impl PronounSet {
    pub fn new(
        subjective: &str,
        objective: &str,
        determiner: &str,
        possessive: &str,
        reflexive: &str,
    ) -> Self {
        PronounSet {
            subjective: subjective.to_string(),
            objective: objective.to_string(),
            determiner: determiner.to_string(),
            possessive: possessive.to_string(),
            reflexive: reflexive.to_string(),
        }
    }

    /// Build a set from a partial, ordered list of forms (subjective first),
    /// deriving any missing trailing forms from the subjective. "they" keeps
    /// its irregular forms; everything else gets s/s/self suffixes.
    pub fn from_forms(forms: &[&str]) -> Self {
        let subjective = forms.first().copied().unwrap_or("they");
        let irregular = subjective == "they";

        let objective = forms
            .get(1)
            .map(|s| s.to_string())
            .unwrap_or_else(|| if irregular { "them".to_string() } else { subjective.to_string() });
        let determiner = forms
            .get(2)
            .map(|s| s.to_string())
            .unwrap_or_else(|| if irregular { "their".to_string() } else { format!("{subjective}s") });
        let possessive = forms
            .get(3)
            .map(|s| s.to_string())
            .unwrap_or_else(|| if irregular { "theirs".to_string() } else { format!("{subjective}s") });
        let reflexive = forms
            .get(4)
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                if irregular {
                    "themself".to_string()
                } else {
                    format!("{subjective}self")
                }
            });

        PronounSet {
            subjective: subjective.to_string(),
            objective,
            determiner,
            possessive,
            reflexive,
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        token == self.subjective
            || token == self.objective
            || token == self.determiner
            || token == self.possessive
            || token == self.reflexive
    }

    /// "they are", but "xe is". Elverson-style sets conjugate singular.
    pub fn to_be_conjugation(&self) -> &'static str {
        if self.subjective == "they" {
            "are"
        } else {
            "is"
        }
    }

    /// "they're", but "xe's".
    pub fn contraction(&self) -> String {
        if self.subjective == "they" {
            "they're".to_string()
        } else {
            format!("{}'s", self.subjective)
        }
    }
}

impl Default for PronounSet {
    fn default() -> Self {
        PronounSet::new("they", "them", "their", "theirs", "themself")
    }
}

impl fmt::Display for PronounSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.subjective, self.objective, self.determiner, self.possessive, self.reflexive
        )
    }
}

/// Known pronoun sets, in lookup-priority order. The Spivak "e" set comes
/// before the plain "e" set so a bare "e" resolves to Spivak forms.
fn catalog() -> &'static [PronounSet] {
    static CATALOG: OnceLock<Vec<PronounSet>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        vec![
            PronounSet::new("they", "them", "their", "theirs", "themself"),
            PronounSet::new("she", "her", "her", "hers", "herself"),
            PronounSet::new("he", "him", "his", "his", "himself"),
            PronounSet::new("it", "it", "its", "its", "itself"),
            PronounSet::new("one", "one", "one's", "one's", "oneself"),
            PronounSet::new("thon", "thon", "thons", "thon's", "thonself"),
            PronounSet::new("ae", "aer", "aer", "aers", "aerself"),
            PronounSet::new("co", "co", "cos", "co's", "coself"),
            PronounSet::new("ve", "ver", "vis", "vers", "verself"),
            PronounSet::new("vi", "vir", "vis", "virs", "virself"),
            PronounSet::new("xe", "xem", "xyr", "xyrs", "xemself"),
            // "per" as in person
            PronounSet::new("per", "per", "per", "pers", "perself"),
            // Elverson
            PronounSet::new("ey", "em", "eir", "eirs", "emself"),
            // humanist
            PronounSet::new("hu", "hum", "hus", "hus", "huself"),
            // Spivak
            PronounSet::new("e", "em", "eir", "eirs", "emself"),
            PronounSet::new("ze", "zir", "zir", "zirs", "zirself"),
            PronounSet::new("fae", "faer", "faer", "faers", "faerself"),
            PronounSet::new("e", "em", "es", "ems", "emself"),
        ]
    })
}

/// Every known pronoun token mapped to its owning set, built once. Where a
/// token appears in several sets, the earliest catalog entry wins.
fn token_index() -> &'static HashMap<&'static str, &'static PronounSet> {
    static INDEX: OnceLock<HashMap<&'static str, &'static PronounSet>> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut index = HashMap::new();
        for set in catalog() {
            for token in [
                set.subjective.as_str(),
                set.objective.as_str(),
                set.determiner.as_str(),
                set.possessive.as_str(),
                set.reflexive.as_str(),
            ] {
                index.entry(token).or_insert(set);
            }
        }
        index
    })
}

fn group_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-zA-Z]+(?: *[/\\] *[a-zA-Z]+)*").unwrap())
}

fn split_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" *[/\\] *").unwrap())
}

/// Parse a pronoun descriptor string. Tries to be fairly lenient to
/// accommodate the wide variety of ways people share their pronouns:
/// "He", "She/her", "They/he", "Xe/xem/xyr/xyrs/xemself".
///
/// Empty input yields the default they-set. Results are deduplicated by
/// their full 5-tuple, preserving first-seen order.
pub fn parse(text: &str) -> Vec<PronounSet> {
    if text.is_empty() {
        return vec![PronounSet::default()];
    }

    fn push_unique(out: &mut Vec<PronounSet>, set: PronounSet) {
        if !out.contains(&set) {
            out.push(set);
        }
    }

    let mut out: Vec<PronounSet> = Vec::new();
    for group in group_pattern().find_iter(text) {
        let tokens: Vec<String> = split_pattern()
            .split(group.as_str())
            .map(str::to_lowercase)
            .collect();

        for (i, token) in tokens.iter().enumerate() {
            if let Some(known) = token_index().get(token.as_str()) {
                push_unique(&mut out, (*known).clone());
            } else if i == 0 {
                // An unknown leading pronoun means the group lists ordered
                // cases (subjective, objective, ...). Consume the rest.
                let forms: Vec<&str> = tokens.iter().take(5).map(String::as_str).collect();
                push_unique(&mut out, PronounSet::from_forms(&forms));
                break;
            } else {
                // Later unknown tokens are treated as standalone subjective
                // pronouns, like the "ce" in "she/ce".
                push_unique(&mut out, PronounSet::from_forms(&[token.as_str()]));
            }
        }
    }

    out
}
