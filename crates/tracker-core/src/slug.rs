//! Slug derivation for branch and worktree names.

use std::path::Path;

/// Maximum length of a title slug inside a branch name.
const MAX_TITLE_SLUG: usize = 50;

/// Slugify a plan title for use in a branch name.
///
/// Lowercases, collapses runs of non-alphanumerics to a single `-`, trims
/// leading/trailing dashes, and truncates to 50 characters. An all-symbol
/// title yields an empty slug; the numeric id prefix keeps the branch name
/// valid regardless.
pub fn title_slug(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_dash = true;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out.truncate(MAX_TITLE_SLUG);
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Branch name for a plan: `plan/<id>-<slug>`.
pub fn branch_name(id: i64, title: &str) -> String {
    let slug = title_slug(title);
    if slug.is_empty() {
        format!("plan/{id}")
    } else {
        format!("plan/{id}-{slug}")
    }
}

/// Slug identifying a project directory inside the worktree base.
///
/// Uses the last two path components joined with `-`, all non-alphanumerics
/// replaced by `-`, so `/home/user/projects/myrepo` becomes
/// `projects-myrepo` and collisions between same-named repos in different
/// parents stay unlikely.
pub fn project_slug(project_path: &Path) -> String {
    let mut parts: Vec<String> = project_path
        .components()
        .rev()
        .take(2)
        .map(|c| sanitize(&c.as_os_str().to_string_lossy()))
        .collect();
    parts.reverse();
    parts.retain(|p| !p.is_empty());
    if parts.is_empty() {
        "unknown".to_string()
    } else {
        parts.join("-")
    }
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}
