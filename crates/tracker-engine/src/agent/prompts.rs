//! Prompt templates for the worker and reviewer roles.
//!
//! Three fixed templates with literal slots. The `<verdict>` tag emitted by
//! the reviewer is wire protocol shared with `verdict::parse_verdict`; do not
//! change its syntax without updating the parser.

/// Prompt for the initial worker invocation.
pub fn worker_prompt(plan_content: &str) -> String {
    format!(
        "You are implementing the following plan in this repository.\n\
         \n\
         <plan>\n{plan_content}\n</plan>\n\
         \n\
         Instructions:\n\
         - Implement the plan completely.\n\
         - Run the repository's own test, lint, and typecheck scripts if present, \
         and fix what they surface.\n\
         - Where useful, add small verification scripts or tests demonstrating the \
         change works.\n\
         - Commit your work locally with clear messages. Never push.\n"
    )
}

/// Prompt for a reviewer pass over the current diff.
pub fn review_prompt(plan_content: &str, diff: &str) -> String {
    format!(
        "You are reviewing an implementation against its plan.\n\
         \n\
         <plan>\n{plan_content}\n</plan>\n\
         \n\
         <diff>\n{diff}\n</diff>\n\
         \n\
         Assess the diff for completeness (does it implement the whole plan?), \
         correctness (does it work, handle edge cases, avoid regressions?), and \
         quality (is it consistent with the surrounding codebase?).\n\
         \n\
         Explain your findings, then end your response with exactly one verdict \
         tag on its own line:\n\
         <verdict>APPROVE</verdict> if the implementation is acceptable, or\n\
         <verdict>REQUEST_CHANGES</verdict> if it needs another pass.\n"
    )
}

/// Prompt resuming the worker with reviewer feedback.
pub fn revision_prompt(feedback: &str) -> String {
    format!(
        "A reviewer has assessed your changes and requests revisions.\n\
         \n\
         <review_feedback>\n{feedback}\n</review_feedback>\n\
         \n\
         Address the feedback and commit the fixes locally. Never push.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_prompt_embeds_plan_body() {
        let prompt = worker_prompt("# Plan\nDo the thing.");
        assert!(prompt.contains("<plan>\n# Plan\nDo the thing.\n</plan>"));
        assert!(prompt.contains("Never push"));
    }

    #[test]
    fn review_prompt_carries_both_tags_and_mandates_verdict() {
        let prompt = review_prompt("the plan", "the diff");
        assert!(prompt.contains("<plan>\nthe plan\n</plan>"));
        assert!(prompt.contains("<diff>\nthe diff\n</diff>"));
        assert!(prompt.contains("<verdict>APPROVE</verdict>"));
        assert!(prompt.contains("<verdict>REQUEST_CHANGES</verdict>"));
    }

    #[test]
    fn revision_prompt_wraps_feedback() {
        let prompt = revision_prompt("fix the tests");
        assert!(prompt.contains("<review_feedback>\nfix the tests\n</review_feedback>"));
    }
}
