//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    /// Create a new helpful error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a suggestion for fixing the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    // === Common error constructors ===

    /// A required external tool is not on PATH
    pub fn missing_dependency(tool: &str, purpose: &str) -> Self {
        Self::new(format!("Required tool not found: {tool}"))
            .with_context(format!("{tool} is needed to {purpose}"))
            .with_suggestion(format!("TRY: Check it is installed: which {tool}"))
            .with_suggestion("TRY: --dry-run to validate the pipeline without remote calls")
    }

    /// No state file exists for the given run
    pub fn state_not_found(path: &Path) -> Self {
        Self::new("No state file for this run")
            .with_context(format!("Expected state at: {}", path.display()))
            .with_suggestion("TRY: Check --output-dir and --session-prefix match the run")
            .with_suggestion("TRY: quarry run ...   # Start the run to create the state file")
    }

    /// State file exists but cannot be parsed
    pub fn state_unreadable(path: &Path, reason: &str) -> Self {
        Self::new(format!("Cannot read state file: {}", path.display()))
            .with_context(reason.to_string())
            .with_suggestion("TRY: Validate the JSON: cat FILE | python3 -m json.tool")
            .with_suggestion(
                "TRY: quarry run with the same arguments - a corrupt state file is \
                 discarded and rebuilt from the remote system",
            )
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn display_includes_all_sections() {
        let err = HelpfulError::new("Something went wrong")
            .with_context("While orchestrating")
            .with_suggestion("Try again");

        let display = format!("{}", err);
        assert!(display.contains("ERROR: Something went wrong"));
        assert!(display.contains("CONTEXT: While orchestrating"));
        assert!(display.contains("Try again"));
    }

    #[test]
    fn missing_dependency_names_the_tool() {
        let err = HelpfulError::missing_dependency("gh", "talk to the remote system");
        let display = format!("{}", err);
        assert!(display.contains("gh"));
        assert!(display.contains("TRY:"));
    }

    #[test]
    fn state_not_found_shows_path() {
        let err = HelpfulError::state_not_found(&PathBuf::from("/tmp/out/t1_state.json"));
        assert!(format!("{}", err).contains("/tmp/out/t1_state.json"));
    }
}
