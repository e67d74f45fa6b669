//! Plan markdown handling.
//!
//! A plan file is opaque to the orchestrator except for its title: the first
//! level-one heading. The body is passed verbatim to the agent.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s+(.+)$").expect("heading pattern is valid"));

/// Extract the title from the first `# Heading` line of a plan file.
///
/// Returns `None` when the file is missing or contains no heading.
pub fn parse_title(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    title_from_content(&content)
}

/// Same extraction over already-loaded content.
pub fn title_from_content(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        HEADING
            .captures(line)
            .map(|caps| caps[1].trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extracts_first_heading() {
        let content = "preamble\n# Add login flow\n\n# Second heading\n";
        assert_eq!(
            title_from_content(content),
            Some("Add login flow".to_string())
        );
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(
            title_from_content("#   Spaced out   \n"),
            Some("Spaced out".to_string())
        );
    }

    #[test]
    fn requires_space_after_hash() {
        assert_eq!(title_from_content("#NoSpace\n"), None);
    }

    #[test]
    fn deeper_headings_do_not_match() {
        assert_eq!(title_from_content("## Subsection\n### Deep\n"), None);
    }

    #[test]
    fn no_heading_returns_none() {
        assert_eq!(title_from_content("just prose\n"), None);
    }

    #[test]
    fn missing_file_returns_none() {
        assert_eq!(parse_title(Path::new("/nonexistent/plan.md")), None);
    }

    #[test]
    fn reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# Disk title").unwrap();
        assert_eq!(parse_title(file.path()), Some("Disk title".to_string()));
    }
}
