use std::collections::{HashMap, HashSet};

use regex::Regex;

/// Resolve a path template against a parameter map.
///
/// Both `:name` (word-boundary-bounded) and `{{name}}` placeholders are
/// supported and may coexist in one template. Parameters without a matching
/// placeholder are ignored; placeholders without a matching parameter are
/// left as literal substrings. Supplying every parameter a template uses is
/// the caller's responsibility.
pub fn resolve_template(template: &str, params: &HashMap<String, String>) -> String {
    let mut resolved = template.to_string();

    for (name, value) in params {
        // `:id` must not rewrite the `:id` prefix of `:idx`.
        if let Ok(pattern) = Regex::new(&format!(":{}\\b", regex::escape(name))) {
            resolved = pattern.replace_all(&resolved, value.as_str()).into_owned();
        }

        resolved = resolved.replace(&format!("{{{{{}}}}}", name), value);
    }

    resolved
}

/// Extract the parameter names a template declares, across both syntaxes.
///
/// Used to strip consumed parameters from a forwarded GET query string.
pub fn template_param_names(template: &str) -> HashSet<String> {
    let mut names = HashSet::new();

    let colon = Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("static pattern");
    for capture in colon.captures_iter(template) {
        names.insert(capture[1].to_string());
    }

    let braced = Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").expect("static pattern");
    for capture in braced.captures_iter(template) {
        names.insert(capture[1].to_string());
    }

    names
}

/// Drop query parameters whose names the template consumed during path
/// substitution; everything else is forwarded verbatim.
pub fn strip_template_params(
    query: &[(String, String)],
    template: &str,
) -> Vec<(String, String)> {
    let consumed = template_param_names(template);

    query
        .iter()
        .filter(|(name, _)| !consumed.contains(name))
        .cloned()
        .collect()
}
