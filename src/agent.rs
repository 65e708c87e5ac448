//! Agent kind names.

/// Canonical name for an agent label.
///
/// Matching is case-insensitive and understands the short aliases used in
/// pane titles (`cc`, `cod`, `gmi`). Unknown labels come back lower-cased,
/// whitespace is left alone.
pub fn normalize_agent_type(label: &str) -> String {
    let lower = label.to_lowercase();
    match lower.as_str() {
        "cc" | "claude-code" | "claude" => "claude".to_string(),
        "cod" | "codex-cli" | "codex" => "codex".to_string(),
        "gmi" | "gemini-cli" | "gemini" => "gemini".to_string(),
        _ => lower,
    }
}

/// Agent kind named in a pane title, if any.
///
/// Full names anywhere in the title win; otherwise the spawn naming scheme
/// `<session>__<short>_<n>` is recognised.
pub fn detect_agent_type(title: &str) -> Option<&'static str> {
    const FULL_NAMES: [&str; 6] = ["claude", "codex", "gemini", "cursor", "windsurf", "aider"];
    const SHORT_FORMS: [(&str, &str); 3] = [("cc", "claude"), ("cod", "codex"), ("gmi", "gemini")];

    let title = title.to_lowercase();

    if let Some(name) = FULL_NAMES.iter().find(|name| title.contains(*name)) {
        return Some(*name);
    }

    SHORT_FORMS
        .iter()
        .find(|(short, _)| has_short_form(&title, short))
        .map(|(_, kind)| *kind)
}

fn has_short_form(title: &str, short: &str) -> bool {
    title.split("__").skip(1).any(|part| {
        let head = part.split('_').next().unwrap_or_default();
        head == short
    })
}
