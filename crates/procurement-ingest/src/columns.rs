//! Column resolver: maps semantic fields to header columns through an ordered
//! fallback chain of matching strategies.

use std::collections::{BTreeMap, BTreeSet};

use encoding_rs::WINDOWS_1251;
use serde::Serialize;

/// Rows inspected when row 0 does not look like a header.
pub const HEADER_SCAN_ROWS: usize = 15;

const NEGATION_WORDS: [&str; 4] = ["не", "not", "non", "без"];
const NEGATED_PREFIXES: [&str; 3] = ["внеплан", "незаплан", "unplan"];

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Normal,
    Inverted,
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    Bytes,
    Normalized,
    Keywords,
    Substring,
}

impl MatchStrategy {
    pub const CHAIN: [Self; 5] =
        [Self::Exact, Self::Bytes, Self::Normalized, Self::Keywords, Self::Substring];
}

#[derive(Debug, Clone, Copy)]
pub struct Alias {
    pub text: &'static str,
    pub polarity: Polarity,
}

impl Alias {
    #[must_use]
    pub const fn normal(text: &'static str) -> Self {
        Self { text, polarity: Polarity::Normal }
    }

    #[must_use]
    pub const fn inverted(text: &'static str) -> Self {
        Self { text, polarity: Polarity::Inverted }
    }
}

/// A semantic field and the header spellings it is known under.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub aliases: &'static [Alias],
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub index: usize,
    pub header: String,
    pub strategy: MatchStrategy,
    pub polarity: Polarity,
}

/// Field name to column mapping for one sheet, built once from its header row.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ColumnMap {
    columns: BTreeMap<&'static str, ResolvedColumn>,
}

impl ColumnMap {
    /// Each header column serves at most one field. Stronger strategies claim
    /// columns first; within a strategy the catalog order decides.
    #[must_use]
    pub fn build(headers: &[String], catalog: &[FieldSpec]) -> Self {
        let mut columns = BTreeMap::new();
        let mut claimed = BTreeSet::new();
        for strategy in MatchStrategy::CHAIN {
            for field in catalog {
                if columns.contains_key(field.name) {
                    continue;
                }
                if let Some(column) = match_field(headers, field, strategy, &claimed) {
                    claimed.insert(column.index);
                    columns.insert(field.name, column);
                }
            }
        }
        Self { columns }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&ResolvedColumn> {
        self.columns.get(field)
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.columns.contains_key(field)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Resolve one name against the headers, trying each strategy over all
/// headers before moving to the next.
#[must_use]
pub fn resolve(headers: &[String], name: &str) -> Option<(usize, MatchStrategy)> {
    MatchStrategy::CHAIN.into_iter().find_map(|strategy| {
        headers
            .iter()
            .position(|header| strategy_matches(strategy, header, name))
            .map(|index| (index, strategy))
    })
}

/// Resolve a field through its aliases.
///
/// Strategies stay the outer loop so an exact hit on a later alias beats a
/// fuzzy hit on an earlier one; within a strategy aliases keep declaration order.
#[must_use]
pub fn resolve_field(headers: &[String], field: &FieldSpec) -> Option<ResolvedColumn> {
    MatchStrategy::CHAIN
        .into_iter()
        .find_map(|strategy| match_field(headers, field, strategy, &BTreeSet::new()))
}

fn match_field(
    headers: &[String],
    field: &FieldSpec,
    strategy: MatchStrategy,
    claimed: &BTreeSet<usize>,
) -> Option<ResolvedColumn> {
    let polar = field.aliases.iter().any(|alias| alias.polarity == Polarity::Inverted);
    field.aliases.iter().find_map(|alias| {
        headers
            .iter()
            .enumerate()
            .filter(|(index, _)| !claimed.contains(index))
            .find(|(_, header)| {
                strategy_matches(strategy, header, alias.text)
                    && (!polar || polarity_agrees(strategy, header, alias.polarity))
            })
            .map(|(index, header)| ResolvedColumn {
                index,
                header: header.clone(),
                strategy,
                polarity: alias.polarity,
            })
    })
}

/// Fuzzy strategies ignore short words, so a negated header and its positive
/// sibling can reduce to the same tokens. There the header text itself must
/// carry the alias polarity.
fn polarity_agrees(strategy: MatchStrategy, header: &str, polarity: Polarity) -> bool {
    match strategy {
        MatchStrategy::Keywords | MatchStrategy::Substring => {
            is_negated(header) == (polarity == Polarity::Inverted)
        }
        MatchStrategy::Exact | MatchStrategy::Bytes | MatchStrategy::Normalized => true,
    }
}

fn is_negated(header: &str) -> bool {
    header.split(|ch: char| !ch.is_alphanumeric()).map(str::to_lowercase).any(|token| {
        NEGATION_WORDS.contains(&token.as_str())
            || NEGATED_PREFIXES.iter().any(|prefix| token.starts_with(prefix))
    })
}

fn strategy_matches(strategy: MatchStrategy, header: &str, name: &str) -> bool {
    let header = header.trim();
    let name = name.trim();
    if header.is_empty() || name.is_empty() {
        return false;
    }
    match strategy {
        MatchStrategy::Exact => header == name,
        MatchStrategy::Bytes => bytes_match(header, name),
        MatchStrategy::Normalized => compact(header) == compact(name),
        MatchStrategy::Keywords => {
            let tokens = keywords(name);
            let header = compact(header);
            !tokens.is_empty() && tokens.iter().all(|token| header.contains(token.as_str()))
        }
        MatchStrategy::Substring => {
            let header = compact(header);
            let name = compact(name);
            header.chars().count() >= 3
                && !name.is_empty()
                && (header.contains(&name) || name.contains(&header))
        }
    }
}

/// Compare the name under UTF-8 and Windows-1251 with the header under the
/// same encodings plus its Latin-1 view, which recovers mis-decoded exports.
fn bytes_match(header: &str, name: &str) -> bool {
    let name_views = [Some(name.as_bytes().to_vec()), cp1251(name)];
    let header_views = [Some(header.as_bytes().to_vec()), cp1251(header), latin1(header)];
    name_views.iter().flatten().any(|name_bytes| {
        header_views.iter().flatten().any(|header_bytes| header_bytes == name_bytes)
    })
}

fn cp1251(text: &str) -> Option<Vec<u8>> {
    let (bytes, _, had_errors) = WINDOWS_1251.encode(text);
    (!had_errors).then(|| bytes.into_owned())
}

fn latin1(text: &str) -> Option<Vec<u8>> {
    text.chars().map(|ch| u8::try_from(u32::from(ch)).ok()).collect()
}

/// Whitespace removed, lowercased, `ё` folded to `е`.
fn compact(text: &str) -> String {
    text.chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .map(|ch| if ch == 'ё' { 'е' } else { ch })
        .collect()
}

fn keywords(name: &str) -> Vec<String> {
    name.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| token.chars().count() > 2)
        .map(compact)
        .collect()
}

/// Pick the header row: row 0 unless it resolves fewer than two catalog
/// fields, otherwise the scanned row resolving the most (earliest on ties).
#[must_use]
pub fn locate_header<F>(row_count: usize, header_at: F, catalog: &[FieldSpec]) -> (usize, ColumnMap)
where
    F: Fn(usize) -> Vec<String>,
{
    let first = ColumnMap::build(&header_at(0), catalog);
    if first.len() >= 2 {
        return (0, first);
    }

    let mut best = (0, first);
    for row in 1..row_count.min(HEADER_SCAN_ROWS) {
        let candidate = ColumnMap::build(&header_at(row), catalog);
        if candidate.len() > best.1.len() {
            best = (row, candidate);
        }
    }
    best
}
