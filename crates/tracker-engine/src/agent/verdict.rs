//! Reviewer verdict extraction.
//!
//! The `<verdict>` tag is the wire protocol between the two agent roles.
//! The *last* tag in the transcript wins, so a reviewer that thinks out loud
//! ("I would normally REQUEST_CHANGES, but...") cannot confuse the loop.

use std::sync::LazyLock;

use regex::Regex;

static VERDICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<verdict>\s*(APPROVE|REQUEST_CHANGES)\s*</verdict>")
        .expect("verdict pattern is valid")
});

/// Outcome of a reviewer pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approve,
    /// Changes requested, with the feedback the worker should address.
    RequestChanges { feedback: String },
}

/// Extract the verdict from a reviewer transcript.
///
/// No tag at all is treated as REQUEST_CHANGES with the full transcript as
/// feedback, so the loop still makes progress and stays bounded by rounds.
pub fn parse_verdict(transcript: &str) -> Verdict {
    match VERDICT
        .captures_iter(transcript)
        .last()
        .map(|caps| caps[1].to_string())
    {
        Some(tag) if tag == "APPROVE" => Verdict::Approve,
        Some(_) => Verdict::RequestChanges {
            feedback: transcript.to_string(),
        },
        None => Verdict::RequestChanges {
            feedback: transcript.to_string(),
        },
    }
}
