use super::{CaptchaError, CaptchaSolver};
use std::io::Write;
use std::process::{Command, Stdio};

/// Runs an external program per challenge
///
/// The PNG is written to the program's stdin; its trimmed stdout is the guess.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    program: String,
    args: Vec<String>,
}

impl CommandSolver {
    /// Builds a solver from `[program, args...]`
    pub fn new(command: &[String]) -> Result<Self, CaptchaError> {
        let (program, args) = command.split_first().ok_or(CaptchaError::NoCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl CaptchaSolver for CommandSolver {
    fn solve(&self, image: &[u8]) -> Result<String, CaptchaError> {
        let spawn_error = |source| CaptchaError::Spawn {
            command: self.display(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image).map_err(spawn_error)?;
        }

        let output = child.wait_with_output().map_err(spawn_error)?;
        if !output.status.success() {
            return Err(CaptchaError::Failed {
                command: self.display(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn command(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(
            CommandSolver::new(&[]),
            Err(CaptchaError::NoCommand)
        ));
    }

    #[test]
    fn test_reads_trimmed_stdout() {
        let solver = CommandSolver::new(&command(&["sh", "-c", "cat >/dev/null; echo ' a1b2c '"])).unwrap();
        assert_eq!(solver.solve(b"png bytes").unwrap(), "a1b2c");
    }

    #[test]
    fn test_stdin_receives_image() {
        let solver = CommandSolver::new(&command(&["cat"])).unwrap();
        assert_eq!(solver.solve(b"xyz").unwrap(), "xyz");
    }

    #[test]
    fn test_non_zero_exit_is_error() {
        let solver = CommandSolver::new(&command(&["sh", "-c", "cat >/dev/null; exit 3"])).unwrap();
        assert!(matches!(
            solver.solve(b""),
            Err(CaptchaError::Failed { .. })
        ));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let solver = CommandSolver::new(&command(&["/nonexistent/solver"])).unwrap();
        assert!(matches!(
            solver.solve(b""),
            Err(CaptchaError::Spawn { .. })
        ));
    }
}
