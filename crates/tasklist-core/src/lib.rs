pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod datastore;
pub mod datetime;
pub mod filter;
pub mod render;
pub mod stats;
pub mod task;

use std::ffi::OsString;
use std::io::{
  self,
  IsTerminal
};

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tasklist"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    datastore::FileStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open store at {}",
        data_dir.display()
      )
    })?;

  let renderer =
    render::TerminalRenderer::new(&cfg)?;
  let mut controller =
    controller::TaskListController::new(
      store,
      &cfg.storage_key(),
      renderer,
      controller::SystemClock
    );

  let mut out = io::stdout();
  match cli::Invocation::from_args(
    cli.rest
  )? {
    | Some(inv) => {
      let action =
        commands::Action::from_invocation(
          &inv
        )?;
      commands::dispatch(
        &mut controller,
        action,
        &mut out
      )?;
    }
    | None => {
      let stdin = io::stdin();
      let prompt =
        stdin.is_terminal();
      commands::run_shell(
        &mut controller,
        stdin.lock(),
        &mut out,
        prompt
      )?;
    }
  }

  info!("done");
  Ok(())
}
