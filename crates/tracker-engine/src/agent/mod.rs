//! External coding-agent supervision.

mod prompts;
mod runner;
mod verdict;

pub use prompts::{revision_prompt, review_prompt, worker_prompt};
pub use runner::{AgentRun, AgentRunner, SessionMode};
pub use verdict::{parse_verdict, Verdict};
