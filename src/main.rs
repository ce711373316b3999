use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mutag::cli::{self, Opt};
use mutag::config::Config;
use mutag::output::Printer;
use mutag::Mutag;

fn init_logging(debug: bool) {
    let default = if debug { "mutag=debug" } else { "mutag=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(opt: &Opt) -> Result<bool> {
    let config = Config::load(opt.config.as_deref()).context("Failed to load configuration")?;
    let name = config.profile_name(opt.profile.as_deref());
    let mut profile = config.profile(name)?;
    if let Some(maildir) = &opt.maildir {
        profile.maildir = maildir.clone();
    }
    if let Some(muhome) = &opt.muhome {
        profile.muhome = muhome.clone();
    }
    debug!(profile = %profile.name, maildir = %profile.maildir.display(), "Using profile");

    let printer = Printer::for_stdout(config.color && !opt.no_color);
    let mutag = Mutag::with_mu(profile, printer);
    let summary = mutag.run(&opt.invocation())?;

    for failure in &summary.failures {
        printer.failure(&failure.path, &failure.error);
    }
    Ok(summary.failures.is_empty())
}

fn main() -> ExitCode {
    let opt = match Opt::parse(std::env::args_os()) {
        Ok(opt) => opt,
        Err(e) if cli::is_info(&e) => {
            println!("{}", e.message);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            return ExitCode::from(cli::USAGE_ERROR);
        }
    };

    init_logging(opt.debug);

    match run(&opt) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("mutag: {e:#}");
            ExitCode::FAILURE
        }
    }
}
