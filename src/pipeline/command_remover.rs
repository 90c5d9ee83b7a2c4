use crate::config::remover::{RemoverConfig, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER};
use crate::error::{BatchError, Result};
use crate::executor::WatermarkRemover;
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Runs an external watermark-removal program as a child process.
///
/// Progress is read from the child's stdout, one percentage per line, using
/// the configured pattern. The child's stderr is logged (at debug level when
/// quiet) and its last line is used as the error message on a non-zero exit.
#[derive(Debug, Clone)]
pub struct CommandRemover {
    config: RemoverConfig,
    progress_re: Regex,
}

impl CommandRemover {
    pub fn new(config: RemoverConfig) -> Result<Self> {
        config.validate()?;
        let progress_re = config.compile_progress_pattern()?;
        Ok(Self {
            config,
            progress_re,
        })
    }

    pub fn program(&self) -> &str {
        &self.config.program
    }

    /// Argument list with placeholders substituted.
    pub fn build_args(&self, input: &Path, output: &Path, quiet: bool) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        let mut args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect();
        if quiet {
            args.extend(self.config.quiet_args.iter().cloned());
        }
        args
    }

    /// Percentage reported on `line`, if it is a progress line.
    pub fn parse_progress(&self, line: &str) -> Option<i64> {
        let line = line.trim_end_matches('\r');
        self.progress_re
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok())
    }
}

#[async_trait]
impl WatermarkRemover for CommandRemover {
    fn name(&self) -> &'static str {
        "CommandRemover"
    }

    async fn remove(
        &self,
        input: &Path,
        output: &Path,
        progress: &mut (dyn FnMut(i64) + Send),
        quiet: bool,
    ) -> Result<()> {
        let program = self.config.program.clone();
        let args = self.build_args(input, output, quiet);
        debug!(%program, ?args, "Spawning watermark remover");

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BatchError::TransformError(format!("failed to start '{}': {}", program, e)))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            BatchError::Unexpected(format!("stdout of '{}' was not captured", program))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            BatchError::Unexpected(format!("stderr of '{}' was not captured", program))
        })?;

        // Drained to EOF so the child never blocks on a full stderr pipe.
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            let mut last_line = None;
            while let Ok(Some(line)) = next_lossy_line(&mut reader, &mut buf).await {
                if quiet {
                    debug!(target: "remover", "{}", line);
                } else {
                    info!(target: "remover", "{}", line);
                }
                if !line.trim().is_empty() {
                    last_line = Some(line);
                }
            }
            last_line
        });

        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        while let Some(line) = next_lossy_line(&mut reader, &mut buf).await? {
            match self.parse_progress(&line) {
                Some(value) => progress(value),
                None if quiet => debug!(target: "remover", "{}", line),
                None => info!(target: "remover", "{}", line),
            }
        }

        let status = child.wait().await?;
        let last_stderr = stderr_task.await.ok().flatten();
        if status.success() {
            return Ok(());
        }
        Err(BatchError::TransformError(match last_stderr {
            Some(line) => format!("{} exited with {}: {}", program, status, line.trim()),
            None => format!("{} exited with {}", program, status),
        }))
    }
}

/// Next `\n`-terminated line, decoded lossily. Tools print file names and
/// locale-encoded messages that are not always valid UTF-8.
async fn next_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn remover() -> CommandRemover {
        CommandRemover::new(RemoverConfig::default()).unwrap()
    }

    #[test]
    fn parses_default_progress_formats() {
        let r = remover();
        assert_eq!(r.parse_progress("42"), Some(42));
        assert_eq!(r.parse_progress("42%"), Some(42));
        assert_eq!(r.parse_progress("progress: 7"), Some(7));
        assert_eq!(r.parse_progress("Progress=100 %\r"), Some(100));
        assert_eq!(r.parse_progress("loading model weights"), None);
        assert_eq!(r.parse_progress("frame 42 of 300"), None);
    }

    #[test]
    fn substitutes_placeholders_and_quiet_args() {
        let config = RemoverConfig {
            args: vec![
                "--in={input}".to_string(),
                "--out".to_string(),
                "{output}".to_string(),
            ],
            ..RemoverConfig::default()
        };
        let r = CommandRemover::new(config).unwrap();
        let input = PathBuf::from("/in/a.mp4");
        let output = PathBuf::from("/out/cleaned_a.mp4");
        assert_eq!(
            r.build_args(&input, &output, false),
            vec!["--in=/in/a.mp4", "--out", "/out/cleaned_a.mp4"]
        );
        assert_eq!(
            r.build_args(&input, &output, true),
            vec!["--in=/in/a.mp4", "--out", "/out/cleaned_a.mp4", "--quiet"]
        );
    }

    // Runs `script` through `sh` with the input and output paths as $1 and $2.
    struct ScriptFixture {
        dir: tempfile::TempDir,
        remover: CommandRemover,
    }

    impl ScriptFixture {
        fn new(script: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let script_path = dir.path().join("remover.sh");
            std::fs::write(&script_path, script).unwrap();
            std::fs::write(dir.path().join("in.mp4"), b"video").unwrap();
            let config = RemoverConfig {
                program: "sh".to_string(),
                args: vec![
                    script_path.to_string_lossy().into_owned(),
                    "{input}".to_string(),
                    "{output}".to_string(),
                ],
                ..RemoverConfig::default()
            };
            let remover = CommandRemover::new(config).unwrap();
            ScriptFixture { dir, remover }
        }

        fn input(&self) -> PathBuf {
            self.dir.path().join("in.mp4")
        }

        fn output(&self) -> PathBuf {
            self.dir.path().join("cleaned_in.mp4")
        }

        async fn run(&self, quiet: bool) -> (Result<()>, Vec<i64>) {
            let mut seen = Vec::new();
            let mut callback = |value: i64| seen.push(value);
            let result = self
                .remover
                .remove(&self.input(), &self.output(), &mut callback, quiet)
                .await;
            (result, seen)
        }
    }

    #[tokio::test]
    async fn forwards_stdout_progress_to_callback() {
        let fixture = ScriptFixture::new(
            "echo 10\necho 'loading model'\necho '50%'\necho 'progress: 90'\ncp \"$1\" \"$2\"\n",
        );

        let (result, seen) = fixture.run(false).await;

        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(seen, vec![10, 50, 90]);
        assert_eq!(std::fs::read(fixture.output()).unwrap(), b"video");
    }

    #[tokio::test]
    async fn tolerates_invalid_utf8_output() {
        let fixture = ScriptFixture::new(
            "printf 'frame \\377\\n'\nprintf 'bad \\377 bytes\\n' >&2\necho 50\ncp \"$1\" \"$2\"\n",
        );

        let (result, seen) = fixture.run(false).await;

        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(seen, vec![50]);
        assert!(fixture.output().exists());
    }

    #[tokio::test]
    async fn non_zero_exit_reports_last_stderr_line() {
        let fixture =
            ScriptFixture::new("echo 20\necho 'warming up' >&2\necho 'codec not found' >&2\nexit 3\n");

        let (result, seen) = fixture.run(true).await;

        match result {
            Err(BatchError::TransformError(msg)) => {
                assert!(msg.starts_with("sh exited with"), "{}", msg);
                assert!(msg.ends_with(": codec not found"), "{}", msg);
            }
            other => panic!("expected TransformError, got {:?}", other),
        }
        assert_eq!(seen, vec![20]);
    }

    #[tokio::test]
    async fn missing_program_fails_to_start() {
        let config = RemoverConfig {
            program: "/nonexistent/markblaster-remover".to_string(),
            ..RemoverConfig::default()
        };
        let remover = CommandRemover::new(config).unwrap();
        let mut callback = |_value: i64| {};

        let result = remover
            .remove(Path::new("/in/a.mp4"), Path::new("/out/a.mp4"), &mut callback, false)
            .await;

        match result {
            Err(BatchError::TransformError(msg)) => {
                assert!(msg.starts_with("failed to start '/nonexistent/markblaster-remover'"), "{}", msg)
            }
            other => panic!("expected TransformError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn quiet_args_reach_the_program() {
        let fixture = ScriptFixture::new("printf '%s' \"$3\" > \"$2\"\n");

        let (result, _) = fixture.run(true).await;
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(std::fs::read_to_string(fixture.output()).unwrap(), "--quiet");

        let (result, _) = fixture.run(false).await;
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(std::fs::read_to_string(fixture.output()).unwrap(), "");
    }
}
