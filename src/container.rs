use crate::color::{self, Level};
use crate::errors::*;
use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::str::FromStr;
use tokio::process::Command;

pub const DEFAULT_TAG: &str = "latest";
pub const DEFAULT_EXECUTABLE: &str = "singularity";
pub const DEFAULT_PREFIX: &str = "docker://";
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

#[derive(Debug, PartialEq, Clone)]
pub struct ImageRef {
    pub repo: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageRef {
    pub fn tag_or_default(&self) -> &str {
        self.tag.as_deref().unwrap_or(DEFAULT_TAG)
    }
}

impl FromStr for ImageRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            bail!("Image reference is empty");
        }
        if let Some((repo, digest)) = s.split_once('@') {
            Ok(ImageRef {
                repo: repo.to_string(),
                tag: None,
                digest: Some(digest.to_string()),
            })
        } else if let Some((repo, tag)) = s.split_once(':') {
            Ok(ImageRef {
                repo: repo.to_string(),
                tag: Some(tag.to_string()),
                digest: None,
            })
        } else {
            Ok(ImageRef {
                repo: s.to_string(),
                tag: None,
                digest: None,
            })
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repo = &self.repo;
        if let Some(digest) = &self.digest {
            write!(f, "{repo}@{digest}")
        } else if let Some(tag) = &self.tag {
            write!(f, "{repo}:{tag}")
        } else {
            write!(f, "{repo}")
        }
    }
}

/// Output of a single invocation of the container executable.
#[derive(Debug)]
pub struct Attempt {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Attempt {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

#[derive(Debug, Default)]
pub struct PullReport {
    pub attempts: Vec<Attempt>,
}

impl PullReport {
    pub fn success(&self) -> bool {
        self.attempts.last().is_some_and(Attempt::success)
    }

    pub fn num_attempts(&self) -> usize {
        self.attempts.len()
    }

    /// Dump the captured output of every attempt, framed by horizontal rules.
    pub fn write_output<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        let failed = !self.success();
        let rule = "_".repeat(79);
        writeln!(w, "{rule}")?;
        for (i, attempt) in self.attempts.iter().enumerate() {
            let level = if i + 1 == self.attempts.len() && !failed {
                Level::Info
            } else {
                Level::Warning
            };
            color::writeln(w, format_args!("Attempt {}:", i + 1), Level::Header)?;
            color::writeln(w, "STDERR:", level)?;
            writeln!(w, "{}", String::from_utf8_lossy(&attempt.stderr))?;
            color::writeln(w, "STDOUT:", level)?;
            writeln!(w, "{}", String::from_utf8_lossy(&attempt.stdout))?;
        }
        writeln!(w, "{rule}")
    }
}

pub async fn exec<I, S>(exe: &str, args: I) -> Result<Attempt>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr> + fmt::Debug,
{
    let mut cmd = Command::new(exe);
    let args = args.into_iter().collect::<Vec<_>>();
    cmd.args(&args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    debug!("Spawning child process: {exe} {:?}", args);
    let child = cmd
        .spawn()
        .with_context(|| anyhow!("Failed to execute {exe:?} binary"))?;

    let out = child
        .wait_with_output()
        .await
        .context("Failed to wait for child process")?;
    debug!("Command exited: {:?}", out.status);
    Ok(Attempt {
        status: out.status,
        stdout: out.stdout,
        stderr: out.stderr,
    })
}

#[derive(Debug, Clone)]
pub struct Puller {
    pub executable: String,
    pub prefix: String,
    pub max_attempts: usize,
    pub show_output_on_failure: bool,
    pub show_output_on_success: bool,
}

impl Default for Puller {
    fn default() -> Self {
        Puller {
            executable: DEFAULT_EXECUTABLE.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            show_output_on_failure: true,
            show_output_on_success: false,
        }
    }
}

impl Puller {
    pub fn url(&self, image: &str) -> String {
        format!("{}{}", self.prefix, image)
    }

    /// Run a no-op command in the image so the executable has to fetch it
    /// into its cache, retrying until it exits successfully.
    pub async fn pull(&self, image: &str) -> Result<PullReport> {
        let url = self.url(image);
        let args = ["exec", "-e", url.as_str(), "echo", "Success!"];

        let mut report = PullReport::default();
        while report.num_attempts() < self.max_attempts.max(1) {
            trace!("Pulling {url:?}, attempt {}", report.num_attempts() + 1);
            let attempt = exec(&self.executable, args).await?;
            let success = attempt.success();
            report.attempts.push(attempt);
            if success {
                break;
            }
        }

        self.write_report(&url, &report, &mut io::stdout().lock())
            .context("Failed to write pull report")?;
        Ok(report)
    }

    /// Write the summary line and, if enabled for this outcome, the
    /// captured output of every attempt.
    pub fn write_report<W: io::Write>(
        &self,
        url: &str,
        report: &PullReport,
        w: &mut W,
    ) -> io::Result<()> {
        let n = report.num_attempts();
        let plural = if n > 1 { "s" } else { "" };
        if report.success() {
            color::writeln(
                w,
                format_args!("Successfully pulled '{url}' in {n} attempt{plural}"),
                Level::Success,
            )?;
            if self.show_output_on_success {
                report.write_output(w)?;
            }
        } else {
            color::writeln(
                w,
                format_args!("Failed to pull '{url}' after {n} attempt{plural}"),
                Level::Failure,
            )?;
            if self.show_output_on_failure {
                report.write_output(w)?;
            }
        }
        Ok(())
    }
}
