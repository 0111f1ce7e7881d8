//! Relevance heuristics used by the search backends.
//!
//! Scores are nominally 0-100. API exact matches sit at 95-100 and CLI hits at
//! 15-25, so an exact registry match always outranks a CLI line.

/// PyPI: the query resolved directly as a project name
pub const PYPI_EXACT: f64 = 95.0;

/// PyPI: first name variation; each later variation scores 10 less
pub const PYPI_VARIATION_BASE: f64 = 80.0;
pub const PYPI_VARIATION_STEP: f64 = 10.0;

/// At most this many variations are requested per query
pub const PYPI_MAX_VARIATIONS: usize = 3;

/// npm: bonus for a case-insensitive exact name match
pub const NPM_EXACT_BONUS: f64 = 20.0;

pub const FORMULA_EXACT: f64 = 100.0;
pub const FORMULA_ALIAS: f64 = 95.0;
pub const FORMULA_PREFIX: f64 = 85.0;
pub const FORMULA_NAME_SUBSTRING: f64 = 70.0;
pub const FORMULA_ALIAS_SUBSTRING: f64 = 60.0;
pub const FORMULA_DESCRIPTION_SUBSTRING: f64 = 40.0;

/// Formula matches kept after sorting
pub const FORMULA_MAX_RESULTS: usize = 15;

pub const CLI_APT: f64 = 20.0;
pub const CLI_DNF: f64 = 25.0;
pub const CLI_GENERIC: f64 = 15.0;

/// Score of the `index`-th PyPI name variation
pub fn pypi_variation_score(index: usize) -> f64 {
    PYPI_VARIATION_BASE - index as f64 * PYPI_VARIATION_STEP
}

/// Name variations tried when the query is not itself a PyPI project, in
/// order. Only the first [`PYPI_MAX_VARIATIONS`] are requested.
pub fn pypi_variations(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    vec![
        lower.clone(),
        query.replace('-', "_"),
        query.replace('_', "-"),
        format!("python-{lower}"),
        format!("py{lower}"),
    ]
}

/// Rescale an npm registry `score.final` (0-1) to 0-100, boost exact names
/// and clamp to 100
pub fn npm_score(final_score: f64, name: &str, query: &str) -> f64 {
    let mut score = final_score * 100.0;
    if name.to_lowercase() == query.to_lowercase() {
        score += NPM_EXACT_BONUS;
    }
    score.min(100.0)
}

/// Tiered score of one curated formula, or `None` when nothing matches.
///
/// Tiers from most to least specific: exact name, exact alias, name prefix,
/// name substring, alias substring, description substring.
pub fn formula_score(name: &str, aliases: &[String], description: &str, query: &str) -> Option<f64> {
    let query = query.to_lowercase();
    let name = name.to_lowercase();
    let aliases: Vec<String> = aliases.iter().map(|alias| alias.to_lowercase()).collect();

    let score = if name == query {
        FORMULA_EXACT
    } else if aliases.iter().any(|alias| *alias == query) {
        FORMULA_ALIAS
    } else if name.starts_with(&query) {
        FORMULA_PREFIX
    } else if name.contains(&query) {
        FORMULA_NAME_SUBSTRING
    } else if aliases.iter().any(|alias| alias.contains(&query)) {
        FORMULA_ALIAS_SUBSTRING
    } else if description.to_lowercase().contains(&query) {
        FORMULA_DESCRIPTION_SUBSTRING
    } else {
        return None;
    };

    Some(score)
}
