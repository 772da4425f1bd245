use crate::container::{Puller, DEFAULT_EXECUTABLE, DEFAULT_MAX_ATTEMPTS, DEFAULT_PREFIX};
use crate::errors::*;
use clap::{ArgAction, CommandFactory, Parser};
use clap_complete::Shell;
use std::io;
use std::path::PathBuf;

/// Pull images listed in a YAML file, so they get cached and can be run
/// without pulling later
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    /// Increase logging output (can be used multiple times)
    #[arg(short, long, action(ArgAction::Count))]
    pub verbose: u8,
    /// A YAML file listing the images to be pulled, either as a map or list
    #[arg(required_unless_present = "completions")]
    pub input: Option<PathBuf>,
    /// Maximum number of times to attempt pulling each image
    #[arg(short = 'a', long, default_value_t = DEFAULT_MAX_ATTEMPTS as u16, value_parser = clap::value_parser!(u16).range(1..))]
    pub max_attempts: u16,
    /// Prefix for the image url
    #[arg(short, long, default_value = DEFAULT_PREFIX)]
    pub prefix: String,
    /// Stop when pulling an image fails, by default all images are attempted even if one fails
    #[arg(long)]
    pub stop_on_failure: bool,
    /// Print the stderr and stdout when pulling an image fails (disable with `=false`)
    #[arg(long, default_value_t = true, num_args = 0..=1, require_equals = true, default_missing_value = "true", action = ArgAction::Set)]
    pub show_output_on_failure: bool,
    /// Print the stderr and stdout when pulling an image succeeds
    #[arg(long, default_value_t = false, num_args = 0..=1, require_equals = true, default_missing_value = "true", action = ArgAction::Set)]
    pub show_output_on_success: bool,
    /// The command for running singularity
    #[arg(long, default_value = DEFAULT_EXECUTABLE)]
    pub singularity_exe: String,
    /// Retrieve the image digests from docker hub or quay.io and pull those instead of the tags (docker images only)
    #[arg(long)]
    pub use_digest: bool,
    /// Generate shell completions and exit
    #[arg(long, value_name = "SHELL", exclusive = true)]
    pub completions: Option<Shell>,
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        if self.use_digest && self.prefix != DEFAULT_PREFIX {
            bail!("--use-digest only works with docker images (prefix {DEFAULT_PREFIX:?})");
        }
        Ok(())
    }

    pub fn puller(&self) -> Puller {
        Puller {
            executable: self.singularity_exe.clone(),
            prefix: self.prefix.clone(),
            max_attempts: usize::from(self.max_attempts),
            show_output_on_failure: self.show_output_on_failure,
            show_output_on_success: self.show_output_on_success,
        }
    }
}

pub fn generate_completions<W: io::Write>(shell: Shell, mut w: W) -> Result<()> {
    clap_complete::generate(shell, &mut Args::command(), "prepull-singularity", &mut w);
    Ok(())
}
