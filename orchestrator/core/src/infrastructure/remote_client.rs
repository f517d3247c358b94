// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Remote Command Client - issues legion extension calls through the
// control plane's command-line client:
//
//   <cli> <minion-id> <function> --timeout=<secs> --out=json
//
// The client process is bounded by the same timeout (plus a small margin)
// and killed if it overruns.

use async_trait::async_trait;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::remote::{
    RemoteCallError, RemoteCommands, REGISTER_FAKES_FUNCTION, WARM_CACHE_FUNCTION,
};

const CLIENT_MARGIN: Duration = Duration::from_secs(5);

const AUTH_MARKERS: &[&str] = &[
    "Authentication error",
    "Failed to authenticate",
    "Authentication failure",
];

const TIMEOUT_MARKERS: &[&str] = &["Minion did not return", "timed out"];

#[derive(Debug, Clone)]
pub struct SaltCommandClient {
    program: String,
    timeout: Duration,
    cache_function: String,
}

impl SaltCommandClient {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            cache_function: WARM_CACHE_FUNCTION.to_string(),
        }
    }

    /// Use a different function for the cache-warm call.
    pub fn with_cache_function(mut self, function: impl Into<String>) -> Self {
        self.cache_function = function.into();
        self
    }

    pub fn args(&self, target: &str, function: &str) -> Vec<String> {
        vec![
            target.to_string(),
            function.to_string(),
            format!("--timeout={}", self.timeout.as_secs().max(1)),
            "--out=json".to_string(),
        ]
    }

    async fn call(&self, target: &str, function: &str) -> Result<(), RemoteCallError> {
        debug!(minion = %target, function, "Issuing remote call");

        let child = Command::new(&self.program)
            .args(self.args(target, function))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RemoteCallError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(self.timeout + CLIENT_MARGIN, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(RemoteCallError::Spawn {
                    program: self.program.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(RemoteCallError::Timeout {
                    function: function.to_string(),
                    target: target.to_string(),
                    timeout: self.timeout,
                })
            }
        };

        classify_output(function, target, self.timeout, &output)?;
        info!(minion = %target, function, "Remote call completed");
        Ok(())
    }
}

#[async_trait]
impl RemoteCommands for SaltCommandClient {
    async fn register_fakes(&self, minion_id: &str) -> Result<(), RemoteCallError> {
        self.call(minion_id, REGISTER_FAKES_FUNCTION).await
    }

    async fn warm_cache(&self, minion_id: &str) -> Result<(), RemoteCallError> {
        self.call(minion_id, &self.cache_function).await
    }
}

/// Map a finished client invocation to success or a typed failure.
pub fn classify_output(
    function: &str,
    target: &str,
    timeout: Duration,
    output: &Output,
) -> Result<(), RemoteCallError> {
    classify(
        function,
        target,
        timeout,
        output.status.success(),
        &String::from_utf8_lossy(&output.stdout),
        &String::from_utf8_lossy(&output.stderr),
    )
}

fn classify(
    function: &str,
    target: &str,
    timeout: Duration,
    success: bool,
    stdout: &str,
    stderr: &str,
) -> Result<(), RemoteCallError> {
    let combined = format!("{}\n{}", stdout, stderr);

    if AUTH_MARKERS.iter().any(|m| combined.contains(m)) {
        return Err(RemoteCallError::AuthenticationFailed {
            function: function.to_string(),
            target: target.to_string(),
            detail: first_line(&combined),
        });
    }

    if TIMEOUT_MARKERS.iter().any(|m| combined.contains(m)) {
        return Err(RemoteCallError::Timeout {
            function: function.to_string(),
            target: target.to_string(),
            timeout,
        });
    }

    if !success {
        return Err(RemoteCallError::CommandFailed {
            function: function.to_string(),
            target: target.to_string(),
            detail: first_line(&combined),
        });
    }

    Ok(())
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no output")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(30);

    #[test]
    fn test_args() {
        let client = SaltCommandClient::new("salt", Duration::from_secs(12));
        assert_eq!(
            client.args("ms-1", "legion.keys"),
            vec!["ms-1", "legion.keys", "--timeout=12", "--out=json"]
        );

        let sub_second = SaltCommandClient::new("salt", Duration::from_millis(200));
        assert_eq!(sub_second.args("ms-1", "legion.cache")[2], "--timeout=1");
    }

    #[test]
    fn test_success() {
        assert!(classify("legion.keys", "ms-1", T, true, "{\"ms-1\": true}", "").is_ok());
    }

    #[test]
    fn test_timeout_is_distinguished() {
        let err = classify(
            "legion.keys",
            "ms-1",
            T,
            false,
            "{\"ms-1\": \"Minion did not return. [No response]\"}",
            "",
        )
        .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_authentication_failure() {
        let err = classify(
            "legion.cache",
            "ms-1",
            T,
            false,
            "",
            "Authentication error occurred.",
        )
        .unwrap_err();
        assert!(matches!(err, RemoteCallError::AuthenticationFailed { .. }));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_other_failure() {
        let err = classify("legion.cache", "ms-1", T, false, "", "\n  No minions matched the target.\n").unwrap_err();
        match err {
            RemoteCallError::CommandFailed { detail, .. } => {
                assert_eq!(detail, "No minions matched the target.")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_client_binary() {
        let client = SaltCommandClient::new("legion-no-such-client", T);
        let err = client.register_fakes("ms-1").await.unwrap_err();
        assert!(matches!(err, RemoteCallError::Spawn { .. }));
    }
}
