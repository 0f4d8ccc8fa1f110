//! Abstraction over "run this locally or on the target host" (spec §4.2).
//!
//! Four primitives: `run`, `mkdir`, `remove_tree`, `copy`. Every caller in
//! this crate goes through the trait so tests can inject a fake and never
//! touch the network or the local shell.

use crate::error::ExecutorError;
use std::path::Path;
use std::process::{Command, Stdio};

/// Captured result of a `run` call. `success` mirrors `ExitStatus::success`;
/// callers that need the script body on failure read it themselves (the
/// executor only carries process output, not source).
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Escape a string for safe use inside single quotes in POSIX shell.
/// Single quotes prevent all interpretation (`$`, `` ` ``, `\`); the only
/// character needing escaping is `'` itself: `'` -> `'\''`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg_attr(test, mockall::automock)]
pub trait RemoteExecutor {
    /// Run `argv[0] argv[1..]` with `env` merged over the inherited
    /// process environment. When `remote` is true the command runs on
    /// the target host instead of locally.
    fn run(
        &self,
        argv: &[String],
        env: &[(String, String)],
        remote: bool,
    ) -> Result<CommandOutput, ExecutorError>;

    /// `mkdir -p` semantics, local or remote.
    fn mkdir(&self, path: &str, remote: bool) -> Result<(), ExecutorError>;

    /// `rm -rf` semantics, local or remote.
    fn remove_tree(&self, path: &str, remote: bool) -> Result<(), ExecutorError>;

    /// Recursive copy from a local path to a path on the target host.
    fn copy(&self, src: &Path, dst: &str) -> Result<(), ExecutorError>;
}

/// Production executor: shells out to `ssh`/`scp`/the local process table.
pub struct SshExecutor {
    pub target_host: String,
    pub remote_user: String,
}

impl SshExecutor {
    pub fn new(target_host: impl Into<String>, remote_user: impl Into<String>) -> Self {
        Self {
            target_host: target_host.into(),
            remote_user: remote_user.into(),
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.remote_user, self.target_host)
    }

    /// Build the single remote command line `ssh` hands to the target
    /// shell: `KEY=VALUE ... argv[0] argv[1..]`, every token shell-quoted.
    /// POSIX `sh` treats leading `WORD=VALUE` tokens on a simple command as
    /// environment assignments scoped to that command alone.
    fn remote_command_line(argv: &[String], env: &[(String, String)]) -> String {
        let mut parts = Vec::with_capacity(env.len() + argv.len());
        for (k, v) in env {
            parts.push(format!("{}={}", k, shell_quote(v)));
        }
        for arg in argv {
            parts.push(shell_quote(arg));
        }
        parts.join(" ")
    }
}

impl RemoteExecutor for SshExecutor {
    fn run(
        &self,
        argv: &[String],
        env: &[(String, String)],
        remote: bool,
    ) -> Result<CommandOutput, ExecutorError> {
        if argv.is_empty() {
            return Err(ExecutorError::CommandFailed {
                argv: String::new(),
                detail: "empty argv".to_string(),
            });
        }

        let output = if remote {
            let cmdline = Self::remote_command_line(argv, env);
            Command::new("ssh")
                .args(["-o", "BatchMode=yes", &self.destination(), "--", &cmdline])
                .stdin(Stdio::null())
                .output()
        } else {
            Command::new(&argv[0])
                .args(&argv[1..])
                .envs(env.iter().map(|(k, v)| (k.clone(), v.clone())))
                .stdin(Stdio::null())
                .output()
        }
        .map_err(|source| ExecutorError::Spawn {
            argv: argv.join(" "),
            source,
        })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn mkdir(&self, path: &str, remote: bool) -> Result<(), ExecutorError> {
        let argv = vec!["mkdir".to_string(), "-p".to_string(), path.to_string()];
        let out = self.run(&argv, &[], remote)?;
        if !out.success {
            return Err(ExecutorError::CommandFailed {
                argv: argv.join(" "),
                detail: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        Ok(())
    }

    fn remove_tree(&self, path: &str, remote: bool) -> Result<(), ExecutorError> {
        let argv = vec!["rm".to_string(), "-rf".to_string(), path.to_string()];
        let out = self.run(&argv, &[], remote)?;
        if !out.success {
            return Err(ExecutorError::CommandFailed {
                argv: argv.join(" "),
                detail: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        Ok(())
    }

    fn copy(&self, src: &Path, dst: &str) -> Result<(), ExecutorError> {
        let src_str = src.to_string_lossy().into_owned();
        let remote_dst = format!("{}:{}", self.destination(), dst);
        let argv = vec![
            "scp".to_string(),
            "-qr".to_string(),
            src_str.clone(),
            remote_dst.clone(),
        ];
        let output = Command::new("scp")
            .args(["-qr", &src_str, &remote_dst])
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ExecutorError::Spawn {
                argv: argv.join(" "),
                source,
            })?;

        if !output.status.success() {
            return Err(ExecutorError::CommandFailed {
                argv: argv.join(" "),
                detail: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("hello"), "'hello'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }

    #[test]
    fn test_remote_command_line_quotes_env_and_argv() {
        let argv = vec!["/var/lib/cdist/conf/explorer/os".to_string()];
        let env = vec![("__explorer".to_string(), "/var/lib/cdist/conf/explorer".to_string())];
        let line = SshExecutor::remote_command_line(&argv, &env);
        assert_eq!(
            line,
            "__explorer='/var/lib/cdist/conf/explorer' '/var/lib/cdist/conf/explorer/os'"
        );
    }

    #[test]
    fn test_mock_run_local() {
        let mut mock = MockRemoteExecutor::new();
        mock.expect_run()
            .withf(|argv, _env, remote| argv == ["echo".to_string(), "hi".to_string()] && !remote)
            .times(1)
            .returning(|_, _, _| {
                Ok(CommandOutput {
                    success: true,
                    stdout: b"hi\n".to_vec(),
                    stderr: vec![],
                })
            });

        let out = mock
            .run(&["echo".to_string(), "hi".to_string()], &[], false)
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout, b"hi\n");
    }
}
