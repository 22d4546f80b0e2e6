//! Output formatting for search results.
//!
//! Supports human-readable terminal output and JSON for scripting. With
//! `--explain`, both formats include the routing decision and the per-arm
//! scores behind each result.

use docket_core::{SearchOutcome, SearchPath};
use serde::Serialize;

/// JSON output structure for a search
#[derive(Serialize)]
pub struct JsonOutput<'a> {
    pub query: &'a str,
    pub engine: &'a str,
    #[serde(flatten)]
    pub outcome: &'a SearchOutcome,
}

/// Formats an outcome as pretty JSON. The outcome always carries its route.
pub fn format_json(query: &str, engine: &str, outcome: &SearchOutcome) -> String {
    let output = JsonOutput {
        query,
        engine,
        outcome,
    };
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
}

/// Describes the route in one line, e.g. `fused (ratio 1.12)`.
fn describe_path(path: &SearchPath) -> String {
    match path {
        SearchPath::CircuitBreaker { ratio } => format!("circuit breaker (ratio {ratio:.2})"),
        SearchPath::Fused { ratio } if ratio.is_finite() => format!("fused (ratio {ratio:.2})"),
        SearchPath::Degraded { reason } => format!("degraded to lexical: {reason}"),
        other => other.label().replace('_', " "),
    }
}

/// Formats an outcome for the terminal.
pub fn format_human(query: &str, outcome: &SearchOutcome, explain: bool) -> String {
    let mut output = String::new();

    if explain {
        output.push_str(&format!("Route: {}\n", describe_path(&outcome.path)));
        if !outcome.citations.is_empty() {
            output.push_str(&format!("Citations: {}\n", outcome.citations.join(", ")));
        }
        if outcome.pool_size > 0 {
            output.push_str(&format!("Candidate pool: {}\n", outcome.pool_size));
        }
        output.push('\n');
    }

    if outcome.results.is_empty() {
        output.push_str(&format!("No results found for \"{}\"", query));
        return output;
    }

    output.push_str(&format!(
        "Found {} opinion{} for \"{}\":\n\n",
        outcome.results.len(),
        if outcome.results.len() == 1 { "" } else { "s" },
        query
    ));

    for (i, result) in outcome.results.iter().enumerate() {
        output.push_str(&format!("{:>3}. {} (score: {:.3})\n", i + 1, result.id, result.score));

        if explain {
            let mut parts = Vec::new();
            if let Some(lexical) = result.lexical {
                parts.push(format!("lexical: {:.3}", lexical));
            }
            if let Some(semantic) = result.semantic {
                parts.push(format!("semantic: {:.3}", semantic));
            }
            if !parts.is_empty() {
                output.push_str(&format!("     [{}]\n", parts.join(", ")));
            }
        }
    }

    output.trim_end().to_string()
}
