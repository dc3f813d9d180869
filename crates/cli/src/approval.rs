//! Asks the person at the terminal whether staged actions may run.

use async_trait::async_trait;
use gamekit_agent::ApprovalGate;
use std::io::Write;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::warn;

pub struct ConsoleApprovalGate;

#[async_trait]
impl ApprovalGate for ConsoleApprovalGate {
    async fn approve(&self, task_id: &str, description: &str) -> bool {
        println!();
        println!("  Staged actions for task {task_id}:");
        for line in description.lines() {
            println!("    {line}");
        }
        print!("  Execute them? [y/N] ");
        if let Err(e) = std::io::stdout().flush() {
            warn!(error = %e, "Could not flush approval prompt");
        }

        let mut lines = BufReader::new(io::stdin()).lines();
        match lines.next_line().await {
            Ok(Some(answer)) => is_yes(&answer),
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Could not read approval answer");
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_yes_approves() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES \n"));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
        assert!(!is_yes("yep"));
    }
}
