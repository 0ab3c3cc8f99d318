//! Remote script execution
//!
//! The collector only knows the `Transport` trait. `CommandTransport` is the
//! production implementation: it wraps whatever local command reaches the
//! hosts (a WinRM client, `pwsh` remoting, an SSH hop) through a template
//! from the configuration file:
//!
//! ```yaml
//! transport:
//!   command: "pwsh -NoProfile -Command - -ComputerName {address} -Port {port}"
//! ```
//!
//! Placeholders: `{name}`, `{address}`, `{port}` (5985 when unset),
//! `{credential}`, `{environment}` and `{script}`. Without `{script}` the
//! script is written to the child's stdin.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use crate::config::{Target, TransportSettings};
use crate::error::TransportError;

/// WinRM HTTP listener
pub const DEFAULT_WINRM_PORT: u16 = 5985;

const SCRIPT_PLACEHOLDER: &str = "{script}";

/// Raw result of one remote execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl TransportOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes one script on one host within `timeout`
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        target: &Target,
        script: &str,
        timeout: Duration,
    ) -> Result<TransportOutput, TransportError>;
}

/// Spawns a local command per execution
#[derive(Debug, Clone)]
pub struct CommandTransport {
    template: Vec<String>,
}

impl CommandTransport {
    pub fn new(settings: &TransportSettings) -> Result<Self, TransportError> {
        let template = shell_words::split(&settings.command)
            .map_err(|e| TransportError::InvalidCommand(format!("{}: {e}", settings.command)))?;
        if template.is_empty() {
            return Err(TransportError::InvalidCommand(
                "transport command is empty".to_string(),
            ));
        }
        Ok(Self { template })
    }

    /// Program and arguments for `target`, and whether the script goes on stdin
    pub fn render(&self, target: &Target, script: &str) -> (Vec<String>, bool) {
        let port = target.port.unwrap_or(DEFAULT_WINRM_PORT).to_string();
        let credential = target.credential.as_deref().unwrap_or("");
        let inline = self.template.iter().any(|w| w.contains(SCRIPT_PLACEHOLDER));

        let words = self
            .template
            .iter()
            .map(|word| {
                let word = word
                    .replace("{name}", &target.name)
                    .replace("{address}", &target.address)
                    .replace("{port}", &port)
                    .replace("{credential}", credential)
                    .replace("{environment}", &target.environment);
                if inline {
                    word.replace(SCRIPT_PLACEHOLDER, script)
                } else {
                    word
                }
            })
            .collect();

        (words, !inline)
    }
}

#[async_trait]
impl Transport for CommandTransport {
    async fn execute(
        &self,
        target: &Target,
        script: &str,
        timeout: Duration,
    ) -> Result<TransportOutput, TransportError> {
        let (words, pipe_script) = self.render(target, script);
        let (program, args) = words
            .split_first()
            .ok_or_else(|| TransportError::InvalidCommand("transport command is empty".to_string()))?;

        let start_time = Instant::now();
        debug!(host = %target.name, program = %program, "spawning transport command");

        let mut child = AsyncCommand::new(program)
            .args(args)
            .stdin(if pipe_script { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TransportError::Spawn)?;

        let stdin = if pipe_script { child.stdin.take() } else { None };
        let run = async move {
            if let Some(mut stdin) = stdin {
                // The child may exit without reading; its status and stderr tell the story.
                if let Err(e) = stdin.write_all(script.as_bytes()).await {
                    debug!("transport command closed stdin early: {e}");
                }
                drop(stdin);
            }
            Ok::<_, std::io::Error>(child.wait_with_output().await?)
        };

        // Dropping `run` on timeout drops the child, which kills it.
        let output = tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(
            host = %target.name,
            exit_code,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "transport command finished"
        );

        Ok(TransportOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(command: &str) -> CommandTransport {
        CommandTransport::new(&TransportSettings {
            command: command.to_string(),
        })
        .unwrap()
    }

    fn target() -> Target {
        let mut target = Target::new("web01", "10.0.0.5").with_environment("production");
        target.credential = Some("svc_health".to_string());
        target
    }

    #[test]
    fn test_render_placeholders() {
        let transport = transport("winrs -r:http://{address}:{port} -u:{credential} --tag {name}@{environment}");
        let (words, stdin) = transport.render(&target(), "Get-Date");

        assert!(stdin);
        assert_eq!(
            words,
            vec![
                "winrs",
                "-r:http://10.0.0.5:5985",
                "-u:svc_health",
                "--tag",
                "web01@production"
            ]
        );
    }

    #[test]
    fn test_render_inline_script() {
        let transport = transport("pwsh -Command '{script}'");
        let (words, stdin) = transport.render(&target(), "Get-Date; exit 0");
        assert!(!stdin);
        assert_eq!(words, vec!["pwsh", "-Command", "Get-Date; exit 0"]);
    }

    #[test]
    fn test_invalid_templates() {
        let empty = CommandTransport::new(&TransportSettings {
            command: "   ".to_string(),
        });
        assert!(matches!(empty, Err(TransportError::InvalidCommand(_))));

        let unbalanced = CommandTransport::new(&TransportSettings {
            command: "pwsh -Command 'oops".to_string(),
        });
        assert!(matches!(unbalanced, Err(TransportError::InvalidCommand(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_is_piped_on_stdin() {
        let output = transport("sh -c cat")
            .execute(&target(), "# probe: cpu_usage\nGet-Date", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(output.is_success());
        assert_eq!(output.stdout, "# probe: cpu_usage\nGet-Date");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_and_stderr() {
        let output = transport("sh -c 'echo denied >&2; exit 3'")
            .execute(&target(), "Get-Date", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stderr.trim(), "denied");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout() {
        let started = Instant::now();
        let result = transport("sleep 10")
            .execute(&target(), "Get-Date", Duration::from_millis(200))
            .await;

        assert!(matches!(result, Err(TransportError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let result = transport("winhealth-no-such-binary-xyz")
            .execute(&target(), "Get-Date", Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(TransportError::Spawn(_))));
    }
}
