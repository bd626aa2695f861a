//! Model resolver
//!
//! Resolves public model names to canonical provider ids

use crate::providers::ImpactProvider;
use crate::utils::error::{AppError, AppResult};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Longest accepted model name
pub const MAX_MODEL_NAME_LEN: usize = 100;

const MAX_SUGGESTIONS: usize = 3;

/// Frequent spellings of well-known models
static TYPO_PATTERNS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("gpt4o", "gpt-4o"),
        ("gpt4omini", "gpt-4o-mini"),
        ("gpt4o-mini", "gpt-4o-mini"),
        ("gpt-4omini", "gpt-4o-mini"),
        ("gpt35turbo", "gpt-3.5-turbo"),
        ("gpt-35-turbo", "gpt-3.5-turbo"),
        ("gpt3.5turbo", "gpt-3.5-turbo"),
        ("gpt4", "gpt-4"),
        ("claudeopus", "claude-3-opus"),
        ("claude3opus", "claude-3-opus"),
        ("claude-3opus", "claude-3-opus"),
        ("claudesonnet", "claude-3-sonnet"),
        ("claude3sonnet", "claude-3-sonnet"),
        ("claude-3sonnet", "claude-3-sonnet"),
        ("claudehaiku", "claude-3-haiku"),
        ("claude3haiku", "claude-3-haiku"),
        ("claude-3haiku", "claude-3-haiku"),
        ("claude35sonnet", "claude-3-5-sonnet"),
        ("claude-35-sonnet", "claude-3-5-sonnet"),
        ("claude3.5sonnet", "claude-3-5-sonnet"),
        ("geminipro", "gemini-pro"),
        ("gemini1.5pro", "gemini-1.5-pro"),
        ("gemini15pro", "gemini-1.5-pro"),
        ("gemini-15-pro", "gemini-1.5-pro"),
    ])
});

/// How a name was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Found in the configured mappings
    Mapping,
    /// Found after typo normalization
    Normalized,
    /// Known to the provider as-is
    Direct,
}

/// A successfully resolved model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    /// Requested name after trimming and lowercasing
    pub requested: String,
    /// Canonical provider id
    pub canonical: String,
    pub via: MatchKind,
}

/// Check a model name and return its normalized form
pub fn validate_model_name(model: &str) -> AppResult<String> {
    let name = model.trim().to_lowercase();

    if name.is_empty() {
        return Err(AppError::Validation("model must not be empty".to_string()));
    }

    if name.len() > MAX_MODEL_NAME_LEN {
        return Err(AppError::Validation(format!(
            "model name exceeds {} characters",
            MAX_MODEL_NAME_LEN
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
    {
        return Err(AppError::Validation(
            "model name may only contain letters, digits, '-', '.' and '_'".to_string(),
        ));
    }

    Ok(name)
}

/// Repair common misspellings of well-known model names
///
/// Expects an already lowercased name. Returns `None` when no fix applies.
pub fn normalize_model_name(name: &str) -> Option<&'static str> {
    if let Some(fixed) = TYPO_PATTERNS.get(name) {
        return Some(fixed);
    }

    if name.starts_with("gpt") && !name.contains('-') {
        if name.starts_with("gpt4o") {
            return Some(if name.contains("mini") { "gpt-4o-mini" } else { "gpt-4o" });
        }
        if name.starts_with("gpt35") || name.starts_with("gpt3.5") {
            return Some("gpt-3.5-turbo");
        }
    }

    if name.starts_with("claude") && name[6..].starts_with(|c: char| c.is_ascii_digit()) {
        if name.contains("opus") {
            return Some("claude-3-opus");
        }
        if name.contains("sonnet") {
            let is_35 = name.contains("35") || name.contains("3.5");
            return Some(if is_35 { "claude-3-5-sonnet" } else { "claude-3-sonnet" });
        }
        if name.contains("haiku") {
            return Some("claude-3-haiku");
        }
    }

    if name.contains("gemini") && !name.contains('-') {
        if name.contains("1.5") || name.contains("15") {
            return Some("gemini-1.5-pro");
        }
        if name.contains("pro") {
            return Some("gemini-pro");
        }
    }

    None
}

/// Rank `candidates` by similarity to `name`, best first, at most three
pub fn find_similar(name: &str, candidates: &[String]) -> Vec<String> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return Vec::new();
    }

    let name_chars: HashSet<char> = name.chars().collect();
    let mut scored: Vec<(f64, &String)> = candidates
        .iter()
        .filter_map(|candidate| {
            let lower = candidate.to_lowercase();
            let candidate_chars: HashSet<char> = lower.chars().collect();
            let common = name_chars.intersection(&candidate_chars).count() as f64;

            if lower.contains(&name) || name.contains(&lower) {
                let longest = name.chars().count().max(lower.chars().count()) as f64;
                return Some((common / longest + 0.3, candidate));
            }

            let union = name_chars.union(&candidate_chars).count() as f64;
            let score = if union > 0.0 { common / union } else { 0.0 };
            (score > 0.4).then_some((score, candidate))
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    let mut seen = HashSet::new();
    scored
        .into_iter()
        .filter(|(_, candidate)| seen.insert(candidate.as_str()))
        .take(MAX_SUGGESTIONS)
        .map(|(_, candidate)| candidate.clone())
        .collect()
}

/// Resolver over an immutable mapping snapshot and the active provider
pub struct ModelResolver {
    mappings: HashMap<String, String>,
    provider: Arc<dyn ImpactProvider>,
}

impl ModelResolver {
    pub fn new(mappings: &HashMap<String, String>, provider: Arc<dyn ImpactProvider>) -> Self {
        let mappings = mappings
            .iter()
            .map(|(alias, canonical)| (alias.trim().to_lowercase(), canonical.trim().to_string()))
            .collect();

        Self { mappings, provider }
    }

    /// Resolve a requested name
    ///
    /// Validation failures are 422; unresolvable names are 404 with suggestions.
    pub fn resolve(&self, model: &str) -> AppResult<ResolvedModel> {
        let requested = validate_model_name(model)?;

        if let Some(canonical) = self.mappings.get(&requested) {
            return Ok(self.resolved(requested.clone(), canonical.clone(), MatchKind::Mapping));
        }

        if let Some(fixed) = normalize_model_name(&requested) {
            if let Some(canonical) = self.mappings.get(fixed) {
                return Ok(self.resolved(requested, canonical.clone(), MatchKind::Normalized));
            }
            if self.provider.supports(fixed) {
                return Ok(self.resolved(requested, fixed.to_string(), MatchKind::Normalized));
            }
        }

        if self.provider.supports(&requested) {
            return Ok(self.resolved(requested.clone(), requested, MatchKind::Direct));
        }

        Err(AppError::ModelNotSupported(self.not_found_message(&requested)))
    }

    fn resolved(&self, requested: String, canonical: String, via: MatchKind) -> ResolvedModel {
        debug!("Resolved model {} -> {} ({:?})", requested, canonical, via);
        ResolvedModel {
            requested,
            canonical,
            via,
        }
    }

    fn not_found_message(&self, requested: &str) -> String {
        let suggestions = find_similar(requested, &self.known_names());

        match suggestions.as_slice() {
            [] => format!(
                "Model '{}' not supported. Check /models for available models.",
                requested
            ),
            [only] => format!("Model '{}' not found. Did you mean '{}'?", requested, only),
            many => format!(
                "Model '{}' not found. Did you mean: {}?",
                requested,
                many.join(", ")
            ),
        }
    }

    /// Sorted, de-duplicated aliases and provider models
    fn known_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .mappings
            .keys()
            .cloned()
            .chain(self.provider.models())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Sorted mapping aliases
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.mappings.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    pub fn provider(&self) -> &Arc<dyn ImpactProvider> {
        &self.provider
    }
}
