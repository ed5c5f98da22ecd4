use crate::types::{PokemonRecord, TypeFilter};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Criteria deciding which records are visible.
///
/// All three criteria are ANDed; an empty search, `favorites_only == false`
/// and `TypeFilter::All` each match everything.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub search: String,
    pub favorites_only: bool,
    pub kind: TypeFilter,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.search.trim().is_empty() && !self.favorites_only && self.kind == TypeFilter::All
    }

    pub fn matches(&self, rec: &PokemonRecord) -> bool {
        let needle = fold(self.search.trim());
        if !needle.is_empty() && !fold(&rec.name).contains(&needle) {
            return false;
        }
        if self.favorites_only && !rec.favorite {
            return false;
        }
        match self.kind {
            TypeFilter::All => true,
            TypeFilter::Only(t) => rec.types.iter().any(|x| x.eq_ignore_ascii_case(t.as_str())),
        }
    }

    /// Matching records, in the order given.
    pub fn apply<'a>(&self, records: &'a [PokemonRecord]) -> Vec<&'a PokemonRecord> {
        if self.is_empty() {
            return records.iter().collect();
        }
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Build a [`Filter`] from a query line.
///
/// Recognised tokens: `type:<t>` / `t:<t>`, `fav` / `favorite` /
/// `fav:true|false`. Everything else is joined into the search text. An
/// unknown type name is kept as search text rather than dropped.
pub fn compile_filter(q: &str) -> Filter {
    let mut f = Filter::default();
    let mut free: Vec<&str> = Vec::new();

    for tok in q.split_whitespace() {
        let lower = tok.to_lowercase();
        if lower == "fav" || lower == "favorite" || lower == "favorites" {
            f.favorites_only = true;
            continue;
        }
        if let Some((k, v)) = lower.split_once(':') {
            match k {
                "type" | "t" => {
                    if let Ok(kind) = v.parse() {
                        f.kind = kind;
                        continue;
                    }
                }
                "fav" | "favorite" => match v {
                    "true" | "yes" | "1" => {
                        f.favorites_only = true;
                        continue;
                    }
                    "false" | "no" | "0" => {
                        f.favorites_only = false;
                        continue;
                    }
                    _ => {}
                },
                _ => {}
            }
        }
        free.push(tok);
    }

    f.search = free.join(" ");
    f
}

/// Lowercase, decompose (NFD) and drop combining marks so "Flabébé" matches
/// "flabebe" whether the input arrives precomposed or decomposed.
pub fn fold(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.nfd().filter(|c| !is_combining_mark(*c)).flat_map(char::to_lowercase) {
        match c {
            'ß' => out.push_str("ss"),
            'æ' => out.push_str("ae"),
            'œ' => out.push_str("oe"),
            'ø' => out.push('o'),
            'ł' => out.push('l'),
            other => out.push(other),
        }
    }
    out
}
