use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{AgentState, PatternCategory};
use crate::error::{Error, PatternFailure, Result};
use crate::sync::{read, write};

/// Version tag of the built-in rule set
pub const DEFAULT_PATTERN_VERSION: &str = "1.0";

/// Which agents a rule applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentScope {
    /// Every agent kind, written as `"*"`
    #[default]
    Any,
    /// One canonical agent kind
    Agent(String),
}

impl AgentScope {
    pub fn agent(kind: impl Into<String>) -> Self {
        AgentScope::from(kind.into())
    }

    /// Whether a rule with this scope is evaluated for `agent_kind`.
    ///
    /// An empty kind only sees wildcard rules.
    pub fn applies_to(&self, agent_kind: &str) -> bool {
        match self {
            AgentScope::Any => true,
            AgentScope::Agent(kind) => !agent_kind.is_empty() && kind == agent_kind,
        }
    }
}

impl From<String> for AgentScope {
    fn from(value: String) -> Self {
        if value.is_empty() || value == "*" {
            AgentScope::Any
        } else {
            AgentScope::Agent(value)
        }
    }
}

impl From<AgentScope> for String {
    fn from(scope: AgentScope) -> Self {
        match scope {
            AgentScope::Any => "*".to_string(),
            AgentScope::Agent(kind) => kind,
        }
    }
}

impl fmt::Display for AgentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentScope::Any => f.write_str("*"),
            AgentScope::Agent(kind) => f.write_str(kind),
        }
    }
}

/// A named text-matching rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    pub name: String,
    /// Regular expression source; empty never matches
    #[serde(rename = "regex")]
    pub expression: String,
    #[serde(default)]
    pub agent: AgentScope,
    pub category: PatternCategory,
    /// Higher priorities are matched and reported first
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip)]
    matcher: Option<Regex>,
}

impl PatternRule {
    pub fn new(
        name: impl Into<String>,
        expression: impl Into<String>,
        agent: AgentScope,
        category: PatternCategory,
        priority: i32,
    ) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            agent,
            category,
            priority,
            description: None,
            matcher: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_compiled(&self) -> bool {
        self.matcher.is_some()
    }

    fn compile(&mut self) -> std::result::Result<(), regex::Error> {
        if self.matcher.is_none() && !self.expression.is_empty() {
            self.matcher = Some(Regex::new(&self.expression)?);
        }
        Ok(())
    }

    fn is_match(&self, content: &str) -> bool {
        self.matcher.as_ref().is_some_and(|re| re.is_match(content))
    }

    fn to_match(&self) -> PatternMatch {
        PatternMatch {
            pattern: self.name.clone(),
            category: self.category,
            state: self.category.suggested_state(),
            priority: self.priority,
        }
    }
}

/// A rule that matched some pane content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Name of the matching rule
    pub pattern: String,
    pub category: PatternCategory,
    /// State this match suggests
    pub state: AgentState,
    pub priority: i32,
}

/// An ordered, priority-sorted set of pattern rules.
///
/// Reads take a shared lock and see a consistent rule list; `add_pattern`
/// and `compile` take the exclusive lock for the insert and re-sort.
#[derive(Debug)]
pub struct PatternLibrary {
    version: String,
    rules: RwLock<Vec<PatternRule>>,
}

impl PatternLibrary {
    /// An empty library
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            rules: RwLock::new(Vec::new()),
        }
    }

    /// A library holding `rules` as given; call [`compile`](Self::compile)
    /// before matching.
    pub fn from_rules(version: impl Into<String>, rules: Vec<PatternRule>) -> Self {
        Self {
            version: version.into(),
            rules: RwLock::new(rules),
        }
    }

    /// An independent library pre-populated with the built-in rules
    pub fn with_defaults() -> Self {
        let lib = Self::from_rules(DEFAULT_PATTERN_VERSION, default_rules());
        if let Err(e) = lib.compile() {
            warn!("built-in pattern rules failed to compile: {}", e);
        }
        lib
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Compile every uncompiled rule and re-sort by priority.
    ///
    /// Rules that fail to parse stay in the library but never match; all
    /// failures are reported together.
    pub fn compile(&self) -> Result<()> {
        let mut rules = write(&self.rules);

        let mut failures = Vec::new();
        for rule in rules.iter_mut() {
            if let Err(e) = rule.compile() {
                warn!(pattern = %rule.name, "pattern failed to compile: {}", e);
                failures.push(PatternFailure {
                    name: rule.name.clone(),
                    message: e.to_string(),
                });
            }
        }

        sort_by_priority(&mut rules);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::PatternCompile { failures })
        }
    }

    /// Compile and insert a rule, keeping the library sorted.
    ///
    /// Rule names are unique: a name already in the library is rejected, as
    /// is an invalid expression, and either leaves the library untouched.
    pub fn add_pattern(&self, mut rule: PatternRule) -> Result<()> {
        rule.compile().map_err(|source| Error::InvalidPattern {
            name: rule.name.clone(),
            source,
        })?;

        let mut rules = write(&self.rules);
        if rules.iter().any(|existing| existing.name == rule.name) {
            return Err(Error::DuplicatePattern { name: rule.name });
        }
        debug!(pattern = %rule.name, priority = rule.priority, "adding pattern");
        rules.push(rule);
        sort_by_priority(&mut rules);
        Ok(())
    }

    /// Add every valid rule from `rules`, returning how many were added.
    ///
    /// Invalid and duplicate rules are skipped and reported together once
    /// the valid ones are in.
    pub fn add_patterns(&self, rules: impl IntoIterator<Item = PatternRule>) -> Result<usize> {
        let mut added = 0;
        let mut failures = Vec::new();

        for rule in rules {
            let name = rule.name.clone();
            match self.add_pattern(rule) {
                Ok(()) => added += 1,
                Err(Error::InvalidPattern { source, .. }) => failures.push(PatternFailure {
                    name,
                    message: source.to_string(),
                }),
                Err(e @ Error::DuplicatePattern { .. }) => failures.push(PatternFailure {
                    name,
                    message: e.to_string(),
                }),
                Err(e) => return Err(e),
            }
        }

        if failures.is_empty() {
            Ok(added)
        } else {
            Err(Error::PatternCompile { failures })
        }
    }

    /// Read rules from a JSON file (an array of rules).
    pub fn load_rules(path: impl AsRef<Path>) -> Result<Vec<PatternRule>> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::PatternFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// All rules applicable to `agent_kind` that match `content`, in priority order
    pub fn match_content(&self, content: &str, agent_kind: &str) -> Vec<PatternMatch> {
        self.collect_matches(content, agent_kind, None)
    }

    /// The highest-priority match, if any
    pub fn match_first(&self, content: &str, agent_kind: &str) -> Option<PatternMatch> {
        if content.is_empty() {
            return None;
        }

        let rules = read(&self.rules);
        rules
            .iter()
            .find(|rule| rule.agent.applies_to(agent_kind) && rule.is_match(content))
            .map(PatternRule::to_match)
    }

    pub fn match_by_category(
        &self,
        content: &str,
        agent_kind: &str,
        category: PatternCategory,
    ) -> Vec<PatternMatch> {
        self.collect_matches(content, agent_kind, Some(category))
    }

    pub fn has_error(&self, content: &str, agent_kind: &str) -> bool {
        self.has_category(content, agent_kind, PatternCategory::Error)
    }

    pub fn has_idle_prompt(&self, content: &str, agent_kind: &str) -> bool {
        self.has_category(content, agent_kind, PatternCategory::Idle)
    }

    pub fn has_thinking_indicator(&self, content: &str, agent_kind: &str) -> bool {
        self.has_category(content, agent_kind, PatternCategory::Thinking)
    }

    pub fn has_completion_signal(&self, content: &str, agent_kind: &str) -> bool {
        self.has_category(content, agent_kind, PatternCategory::Completion)
    }

    /// Copy of every rule, in priority order
    pub fn patterns(&self) -> Vec<PatternRule> {
        read(&self.rules).clone()
    }

    pub fn patterns_by_category(&self, category: PatternCategory) -> Vec<PatternRule> {
        read(&self.rules)
            .iter()
            .filter(|rule| rule.category == category)
            .cloned()
            .collect()
    }

    /// Rules evaluated for `agent_kind`, wildcard rules included
    pub fn patterns_by_agent(&self, agent_kind: &str) -> Vec<PatternRule> {
        read(&self.rules)
            .iter()
            .filter(|rule| rule.agent.applies_to(agent_kind))
            .cloned()
            .collect()
    }

    pub fn pattern_count(&self) -> usize {
        read(&self.rules).len()
    }

    fn has_category(&self, content: &str, agent_kind: &str, category: PatternCategory) -> bool {
        if content.is_empty() {
            return false;
        }

        read(&self.rules).iter().any(|rule| {
            rule.category == category && rule.agent.applies_to(agent_kind) && rule.is_match(content)
        })
    }

    fn collect_matches(
        &self,
        content: &str,
        agent_kind: &str,
        category: Option<PatternCategory>,
    ) -> Vec<PatternMatch> {
        if content.is_empty() {
            return Vec::new();
        }

        let rules = read(&self.rules);
        rules
            .iter()
            .filter(|rule| category.map_or(true, |c| rule.category == c))
            .filter(|rule| rule.agent.applies_to(agent_kind))
            .filter(|rule| rule.is_match(content))
            .map(PatternRule::to_match)
            .collect()
    }
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// Stable sort: equal priorities keep insertion order.
fn sort_by_priority(rules: &mut [PatternRule]) {
    rules.sort_by(|a, b| b.priority.cmp(&a.priority));
}

static DEFAULT_LIBRARY: Lazy<Arc<PatternLibrary>> =
    Lazy::new(|| Arc::new(PatternLibrary::with_defaults()));

/// The process-wide shared library, built on first use
pub fn default_library() -> Arc<PatternLibrary> {
    Arc::clone(&DEFAULT_LIBRARY)
}

pub fn match_patterns(content: &str, agent_kind: &str) -> Vec<PatternMatch> {
    DEFAULT_LIBRARY.match_content(content, agent_kind)
}

pub fn match_first_pattern(content: &str, agent_kind: &str) -> Option<PatternMatch> {
    DEFAULT_LIBRARY.match_first(content, agent_kind)
}

pub fn has_error_pattern(content: &str, agent_kind: &str) -> bool {
    DEFAULT_LIBRARY.has_error(content, agent_kind)
}

pub fn has_idle_pattern(content: &str, agent_kind: &str) -> bool {
    DEFAULT_LIBRARY.has_idle_prompt(content, agent_kind)
}

pub fn has_thinking_pattern(content: &str, agent_kind: &str) -> bool {
    DEFAULT_LIBRARY.has_thinking_indicator(content, agent_kind)
}

fn rule(
    name: &str,
    expression: &str,
    agent: &str,
    category: PatternCategory,
    priority: i32,
    description: &str,
) -> PatternRule {
    PatternRule::new(
        name,
        expression,
        AgentScope::from(agent.to_string()),
        category,
        priority,
    )
    .with_description(description)
}

#[rustfmt::skip]
fn default_rules() -> Vec<PatternRule> {
    use PatternCategory::{Completion, Error, Idle, Thinking};

    vec![
        // Idle prompts
        rule("claude_prompt", r"(?i)claude\s*>?\s*$", "claude", Idle, 100, "Claude prompt"),
        rule("claude_code_prompt", r"(?i)claude\s+code\s*>?\s*$", "claude", Idle, 101, "Claude Code prompt"),
        rule("claude_arrow_prompt", r"╰─>\s*$", "claude", Idle, 99, "Claude arrow prompt"),
        rule("codex_prompt", r"(?i)codex\s*>?\s*$", "codex", Idle, 100, "Codex prompt"),
        rule("codex_dollar", r"\$\s*$", "codex", Idle, 50, "Codex dollar prompt"),
        rule("gemini_prompt", r"(?i)gemini\s*>?\s*$", "gemini", Idle, 100, "Gemini prompt"),
        rule("gemini_triple_arrow", r">>>\s*$", "gemini", Idle, 90, "Gemini triple arrow prompt"),
        rule("shell_dollar", r"\$\s*$", "*", Idle, 20, "Shell dollar prompt"),
        rule("shell_percent", r"%\s*$", "*", Idle, 20, "Shell percent prompt"),
        rule("shell_hash", r"#\s*$", "*", Idle, 20, "Shell hash prompt"),
        rule("generic_angle", r">\s*$", "*", Idle, 10, "Generic angle prompt"),
        // Rate limits and quota
        rule("rate_limit_text", r"(?i)rate\s+limit", "*", Error, 200, "Rate limit text"),
        rule("http_429", r"\b429\b", "*", Error, 200, "HTTP 429 status"),
        rule("too_many_requests", r"(?i)too\s+many\s+requests", "*", Error, 200, "Too many requests"),
        rule("quota_exceeded", r"(?i)quota\s+exceeded", "*", Error, 200, "Quota exceeded"),
        // API failures
        rule("api_error", r"(?i)(?:api\s+)?error:\s*\S", "*", Error, 180, "API error"),
        rule("exception", r"(?i)exception:\s*\S", "*", Error, 180, "Exception"),
        rule("failed_text", r"(?i)\bfailed\b.*(?:to|with|:|$)", "*", Error, 150, "Failed operation"),
        // Crashes
        rule("panic", r"(?i)^panic:", "*", Error, 250, "Go panic"),
        rule("sigsegv", r"SIGSEGV", "*", Error, 250, "Segmentation fault"),
        rule("sigkill", r"(?i)(?:killed|SIGKILL)", "*", Error, 250, "Process killed"),
        rule("process_exited", r"(?i)(?:process|agent)\s+(?:exited|terminated|crashed)", "*", Error, 240, "Process exited"),
        // Auth
        rule("unauthorized", r"(?i)unauthorized", "*", Error, 190, "Unauthorized"),
        rule("invalid_key", r"(?i)invalid.*(?:api\s*)?key", "*", Error, 190, "Invalid API key"),
        rule("auth_failed", r"(?i)authentication\s+(?:failed|error)", "*", Error, 190, "Authentication failed"),
        // Network
        rule("connection_refused", r"(?i)connection\s+refused", "*", Error, 170, "Connection refused"),
        rule("timeout_error", r"(?i)(?:connection|request)\s+timed?\s*out", "*", Error, 170, "Timeout error"),
        rule("network_error", r"(?i)network\s+error", "*", Error, 170, "Network error"),
        // Thinking
        rule("braille_spinner", r"[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏]", "*", Thinking, 80, "Braille spinner"),
        rule("dots_spinner", r"\.{3,}$", "*", Thinking, 70, "Dots spinner"),
        rule("thinking_text", r"(?i)thinking\.{0,3}$", "*", Thinking, 85, "Thinking text"),
        rule("processing_text", r"(?i)processing\.{0,3}$", "*", Thinking, 85, "Processing text"),
        rule("analyzing_text", r"(?i)analyzing\.{0,3}$", "*", Thinking, 85, "Analyzing text"),
        rule("extended_thinking", r"(?i)(?:thinking\s+deeply|extended\s+thinking)", "*", Thinking, 90, "Extended thinking"),
        rule("loading_text", r"(?i)loading\.{0,3}$", "*", Thinking, 75, "Loading text"),
        rule("waiting_text", r"(?i)(?:please\s+)?wait(?:ing)?\.{0,3}$", "*", Thinking, 75, "Waiting text"),
        // Completion
        rule("done_text", r"(?i)(?:^|\s)done[.!]?\s*$", "*", Completion, 60, "Done text"),
        rule("complete_text", r"(?i)(?:^|\s)(?:completed?|finished)[.!]?\s*$", "*", Completion, 60, "Complete/Finished text"),
        rule("checkmark", r"[✓✔]\s*$", "*", Completion, 65, "Checkmark symbol"),
        rule("summary_header", r"(?i)^(?:summary|changes\s+made):", "*", Completion, 55, "Summary header"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(name: &str, expression: &str, priority: i32) -> PatternRule {
        PatternRule::new(
            name,
            expression,
            AgentScope::Any,
            PatternCategory::Thinking,
            priority,
        )
    }

    fn assert_sorted(lib: &PatternLibrary) {
        let priorities: Vec<i32> = lib.patterns().iter().map(|p| p.priority).collect();
        assert!(
            priorities.windows(2).all(|w| w[0] >= w[1]),
            "patterns not sorted: {:?}",
            priorities
        );
    }

    #[test]
    fn test_default_library_compiles() {
        let lib = PatternLibrary::with_defaults();
        assert!(lib.compile().is_ok());
        assert_eq!(lib.version(), DEFAULT_PATTERN_VERSION);
        assert!(lib.patterns().iter().all(PatternRule::is_compiled));
        assert_sorted(&lib);
    }

    #[test]
    fn test_compile_is_idempotent() {
        let lib = PatternLibrary::with_defaults();
        let before: Vec<String> = lib.patterns().into_iter().map(|p| p.name).collect();

        lib.compile().unwrap();
        lib.compile().unwrap();

        let after: Vec<String> = lib.patterns().into_iter().map(|p| p.name).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_compile_reports_all_failures_and_keeps_valid() {
        let lib = PatternLibrary::from_rules(
            "test",
            vec![
                custom("good", r"ok$", 10),
                custom("bad_group", r"(unclosed", 20),
                custom("bad_class", r"[z-a]", 5),
            ],
        );

        let err = lib.compile().unwrap_err();
        assert_eq!(err.pattern_names(), vec!["bad_group", "bad_class"]);

        assert_eq!(lib.pattern_count(), 3);
        assert!(lib.has_thinking_indicator("all ok", ""));
        assert!(!lib.has_thinking_indicator("(unclosed", ""));
    }

    #[test]
    fn test_add_invalid_pattern_leaves_library_unchanged() {
        let lib = PatternLibrary::with_defaults();
        let count = lib.pattern_count();

        let err = lib.add_pattern(custom("broken", r"(?P<", 1)).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { ref name, .. } if name == "broken"));
        assert_eq!(lib.pattern_count(), count);
    }

    #[test]
    fn test_add_pattern_priority_placement() {
        let lib = PatternLibrary::with_defaults();

        lib.add_pattern(custom("top", r"xyzzy", 10_000)).unwrap();
        lib.add_pattern(custom("bottom", r"plugh", -10_000)).unwrap();

        let patterns = lib.patterns();
        assert_eq!(patterns.first().unwrap().name, "top");
        assert_eq!(patterns.last().unwrap().name, "bottom");
        assert_sorted(&lib);
    }

    #[test]
    fn test_equal_priorities_keep_insertion_order() {
        let lib = PatternLibrary::new("test");
        lib.add_pattern(custom("first", "a", 5)).unwrap();
        lib.add_pattern(custom("second", "a", 5)).unwrap();
        lib.add_pattern(custom("third", "a", 5)).unwrap();

        let names: Vec<String> = lib.patterns().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_empty_expression_never_matches() {
        let lib = PatternLibrary::new("test");
        lib.add_pattern(custom("empty", "", 1)).unwrap();

        assert_eq!(lib.pattern_count(), 1);
        assert!(lib.match_content("anything at all", "").is_empty());
    }

    #[test]
    fn test_empty_content_yields_no_matches() {
        let lib = PatternLibrary::with_defaults();
        assert!(lib.match_content("", "claude").is_empty());
        assert!(lib.match_first("", "claude").is_none());
        assert!(!lib.has_idle_prompt("", "claude"));
    }

    #[test]
    fn test_match_respects_agent_scope() {
        let lib = PatternLibrary::with_defaults();

        let claude: Vec<String> = lib
            .match_content("claude>", "claude")
            .into_iter()
            .map(|m| m.pattern)
            .collect();
        assert!(claude.contains(&"claude_prompt".to_string()));
        assert!(claude.contains(&"generic_angle".to_string()));

        let codex: Vec<String> = lib
            .match_content("claude>", "codex")
            .into_iter()
            .map(|m| m.pattern)
            .collect();
        assert!(!codex.contains(&"claude_prompt".to_string()));

        // Empty agent kind only sees wildcard rules
        let anonymous: Vec<String> = lib
            .match_content("claude>", "")
            .into_iter()
            .map(|m| m.pattern)
            .collect();
        assert_eq!(anonymous, vec!["generic_angle".to_string()]);
    }

    #[test]
    fn test_match_order_and_single_entry_per_rule() {
        let lib = PatternLibrary::with_defaults();
        let matches = lib.match_content("rate limit hit\nrate limit again\nError: boom\n$ ", "");

        let names: Vec<&str> = matches.iter().map(|m| m.pattern.as_str()).collect();
        assert_eq!(names.iter().filter(|n| **n == "rate_limit_text").count(), 1);
        assert!(matches.windows(2).all(|w| w[0].priority >= w[1].priority));
        assert_eq!(matches[0].category, PatternCategory::Error);
        assert_eq!(matches[0].state, AgentState::Error);
    }

    #[test]
    fn test_match_first_and_category_helpers() {
        let lib = PatternLibrary::with_defaults();

        let first = lib.match_first("panic: runtime error", "codex").unwrap();
        assert_eq!(first.pattern, "panic");

        let thinking = lib.match_by_category("Thinking...", "claude", PatternCategory::Thinking);
        assert!(thinking.iter().any(|m| m.pattern == "thinking_text"));
        assert!(thinking.iter().all(|m| m.category == PatternCategory::Thinking));

        assert!(lib.has_error("connection refused", "gemini"));
        assert!(lib.has_idle_prompt("user@host:~$ ", ""));
        assert!(lib.has_thinking_indicator("⠋ working", "codex"));
        assert!(lib.has_completion_signal("All tasks completed.", "claude"));
        assert!(!lib.has_error("everything is fine", "claude"));
    }

    #[test]
    fn test_returned_collections_are_copies() {
        let lib = PatternLibrary::with_defaults();
        let count = lib.pattern_count();

        let mut patterns = lib.patterns();
        patterns.clear();
        let mut errors = lib.patterns_by_category(PatternCategory::Error);
        errors.truncate(1);

        assert_eq!(lib.pattern_count(), count);
        assert!(lib.patterns_by_category(PatternCategory::Error).len() > 1);
    }

    #[test]
    fn test_patterns_by_agent_includes_wildcards() {
        let lib = PatternLibrary::with_defaults();
        let gemini = lib.patterns_by_agent("gemini");

        assert!(gemini.iter().any(|p| p.name == "gemini_prompt"));
        assert!(gemini.iter().any(|p| p.name == "shell_dollar"));
        assert!(!gemini.iter().any(|p| p.name == "claude_prompt"));
    }

    #[test]
    fn test_rule_json_shape() {
        let json = r#"[
            {"name": "deploy_failed", "regex": "(?i)deploy failed", "agent": "*", "category": "error", "priority": 300},
            {"name": "codex_ready", "regex": "ready>\\s*$", "agent": "codex", "category": "idle"}
        ]"#;
        let rules: Vec<PatternRule> = serde_json::from_str(json).unwrap();

        assert_eq!(rules[0].agent, AgentScope::Any);
        assert_eq!(rules[1].agent, AgentScope::agent("codex"));
        assert_eq!(rules[1].priority, 0);

        let lib = PatternLibrary::new("custom");
        assert_eq!(lib.add_patterns(rules).unwrap(), 2);
        assert_eq!(lib.patterns()[0].name, "deploy_failed");

        let out = serde_json::to_value(&lib.patterns()[0]).unwrap();
        assert_eq!(out["agent"], "*");
        assert_eq!(out["regex"], "(?i)deploy failed");
    }

    #[test]
    fn test_add_pattern_rejects_duplicate_name() {
        let lib = PatternLibrary::with_defaults();
        let count = lib.pattern_count();

        let err = lib
            .add_pattern(PatternRule::new(
                "claude_prompt",
                "claude",
                AgentScope::Any,
                PatternCategory::Idle,
                5,
            ))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicatePattern { ref name } if name == "claude_prompt"));
        assert_eq!(lib.pattern_count(), count);

        let matches = lib.match_content("claude>", "claude");
        let named: Vec<_> = matches
            .iter()
            .filter(|m| m.pattern == "claude_prompt")
            .collect();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].priority, 100);
    }

    #[test]
    fn test_add_patterns_skips_duplicates() {
        let lib = PatternLibrary::new("custom");
        let err = lib
            .add_patterns(vec![
                custom("spin", "a", 1),
                custom("spin", "b", 9),
                custom("other", "c", 2),
            ])
            .unwrap_err();

        assert_eq!(err.pattern_names(), vec!["spin"]);
        assert_eq!(lib.pattern_count(), 2);
        assert!(lib.has_thinking_indicator("a", ""));
        assert!(!lib.has_thinking_indicator("b", ""));
    }

    #[test]
    fn test_add_patterns_adds_valid_and_reports_invalid() {
        let lib = PatternLibrary::new("custom");
        let err = lib
            .add_patterns(vec![custom("ok", "fine", 1), custom("bad", "(", 2)])
            .unwrap_err();

        assert_eq!(err.pattern_names(), vec!["bad"]);
        assert_eq!(lib.pattern_count(), 1);
    }

    #[test]
    fn test_load_rules_from_file() {
        let path = std::env::temp_dir().join(format!(
            "agent-activity-rules-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"[{"name": "oops", "regex": "oops", "category": "error", "priority": 1}]"#,
        )
        .unwrap();

        let rules = PatternLibrary::load_rules(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "oops");

        let missing = PatternLibrary::load_rules(path.with_extension("missing"));
        assert!(matches!(missing, Err(Error::PatternFile { .. })));
    }

    #[test]
    fn test_shared_default_library() {
        let a = default_library();
        let b = default_library();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(has_error_pattern("HTTP 429 Too Many Requests", "claude"));
        assert!(has_idle_pattern("gemini>", "gemini"));
        assert!(has_thinking_pattern("Analyzing...", ""));
        assert_eq!(match_first_pattern("SIGSEGV", "").unwrap().pattern, "sigsegv");
        assert!(!match_patterns("claude>", "claude").is_empty());
    }

    #[test]
    fn test_concurrent_reads_during_writes() {
        let lib = PatternLibrary::with_defaults();
        let base = lib.pattern_count();

        std::thread::scope(|s| {
            for i in 0..4 {
                let lib = &lib;
                s.spawn(move || {
                    for j in 0..25 {
                        lib.add_pattern(custom(&format!("w{}_{}", i, j), "zzz", i * 100 + j))
                            .unwrap();
                    }
                });
            }
            for _ in 0..4 {
                let lib = &lib;
                s.spawn(move || {
                    for _ in 0..50 {
                        let matches = lib.match_content("panic: runtime error", "claude");
                        assert_eq!(matches.first().map(|m| m.pattern.as_str()), Some("panic"));
                    }
                });
            }
        });

        assert_eq!(lib.pattern_count(), base + 100);
        assert_sorted(&lib);
    }
}
