//! `codeql` backed suite resolver.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::{stderr_excerpt, ClientError, SuiteResolver};

const CODEQL: &str = "codeql";

/// Resolves a query suite (pack reference or `.qls` path) into the ordered
/// list of query paths it contains.
#[derive(Debug, Default)]
pub struct CodeqlResolver;

impl CodeqlResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SuiteResolver for CodeqlResolver {
    async fn resolve(&self, suite: &str) -> Result<Vec<String>, ClientError> {
        debug!("Resolving queries from suite: {}", suite);
        let output = Command::new(CODEQL)
            .args(["resolve", "queries", "--", suite])
            .output()
            .await
            .map_err(|source| ClientError::Spawn {
                program: CODEQL,
                source,
            })?;
        if !output.status.success() {
            return Err(ClientError::CommandFailed {
                program: CODEQL,
                status: output.status.to_string(),
                stderr: stderr_excerpt(&output.stderr),
            });
        }
        Ok(parse_query_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// One query path per line; anything that is not a `.ql` file is noise.
fn parse_query_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.ends_with(".ql"))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_query_list_keeps_ql_lines_in_order() {
        let stdout = "\
/work/cpp/misra/src/rules/RULE-1-1/A.ql
/work/cpp/misra/src/rules/RULE-1-2/B.ql

Resolved 2 queries.
/work/notes.md
";
        let queries = parse_query_list(stdout);
        assert_eq!(
            queries,
            vec![
                "/work/cpp/misra/src/rules/RULE-1-1/A.ql",
                "/work/cpp/misra/src/rules/RULE-1-2/B.ql",
            ]
        );
    }

    #[test]
    fn parse_query_list_empty_output() {
        assert!(parse_query_list("").is_empty());
    }
}
