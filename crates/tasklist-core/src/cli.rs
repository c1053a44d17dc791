use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{expand_command_abbrev, known_command_names};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tasklist",
    version,
    about = "Tasklist: a small prioritized to-do list for the terminal",
    disable_help_subcommand = true,
    arg_required_else_help = false
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    /// Run a single command instead of the interactive shell.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

/// `-q` wins over `-v`; `RUST_LOG` wins over both.
fn default_log_level(verbose: u8, quiet: u8) -> &'static str {
    match (quiet, verbose) {
        (2.., _) => "error",
        (1, _) | (0, 0) => "warn",
        (0, 1) => "info",
        (0, 2) => "debug",
        (0, _) => "trace",
    }
}

/// Log lines go to stderr so they never interleave with the rendered list.
pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_log_level(verbose, quiet)))
        .map_err(|e| anyhow!("invalid RUST_LOG filter: {e}"))?;

    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
    if let Err(err) = installed {
        debug!(error = %err, "tracing subscriber already set");
    }

    Ok(())
}

/// Pulls positional `rc.KEY=VALUE` overrides out of argv.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some((key, value)) = s.strip_prefix("rc.").and_then(|rest| rest.split_once('=')) {
            debug!(key, value, "captured positional rc override");
            overrides.push((format!("rc.{key}"), value.to_string()));
            continue;
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

/// A command word (already expanded from any unique prefix) and the text
/// that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub rest: String,
}

impl Invocation {
    /// Parses one shell line. Blank lines yield `None`.
    #[tracing::instrument]
    pub fn from_line(line: &str) -> anyhow::Result<Option<Self>> {
        let line = line.trim_start();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim_start()),
            None => (line.trim_end(), ""),
        };
        if word.is_empty() {
            return Ok(None);
        }

        let command = resolve_command(word)?;
        debug!(token = %word, expanded = %command, "resolved command token");
        Ok(Some(Self {
            command: command.to_string(),
            rest: rest.trim_end_matches(['\r', '\n']).to_string(),
        }))
    }

    pub fn from_args(args: Vec<OsString>) -> anyhow::Result<Option<Self>> {
        let tokens: Vec<String> = args
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();
        let Some((first, tail)) = tokens.split_first() else {
            return Ok(None);
        };

        let command = resolve_command(first)?;
        Ok(Some(Self {
            command: command.to_string(),
            rest: tail.join(" "),
        }))
    }

    pub fn args(&self) -> Vec<&str> {
        self.rest.split_whitespace().collect()
    }
}

fn resolve_command(token: &str) -> anyhow::Result<&'static str> {
    let lowered = token.to_ascii_lowercase();
    let known = known_command_names();
    expand_command_abbrev(&lowered, &known)
        .ok_or_else(|| {
            let candidates: Vec<&str> = known
                .iter()
                .copied()
                .filter(|name| name.starts_with(lowered.as_str()))
                .collect();
            if candidates.is_empty() {
                anyhow!("unknown command: {token}")
            } else {
                anyhow!("ambiguous command {token}: {}", candidates.join(", "))
            }
        })
}
