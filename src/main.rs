#![warn(
    noop_method_call,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_lifetimes,
    unused_qualifications,
    clippy::pedantic
)]
#![allow(
    clippy::match_bool,
    clippy::module_name_repetitions,
    clippy::items_after_statements,
)]

use ::std::{path::PathBuf, process::ExitCode};

mod asset_path;
mod config;
mod directive;
mod fonts;
mod html;
mod include_pretty;
mod templater;

mod util;
use self::{
    config::{BuildMode, Config, FailurePolicy},
    util::Aborted,
};

/// Build tasks for the static site: renders pages to HTML and copies fonts.
#[derive(clap::Parser)]
struct Args {
    /// Path to the site's config file.
    #[clap(long, default_value = "site.toml")]
    config: PathBuf,

    /// Build mode. `production` stops at the first failure and exits with status 1; any other
    /// mode logs failures and carries on.
    #[clap(long, env = "BUILD_MODE", default_value = "development")]
    mode: BuildMode,

    /// Tasks to run. Runs all of them when none are given.
    #[clap(value_enum)]
    tasks: Vec<Task>,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Task {
    Html,
    Fonts,
}

const ALL_TASKS: &[Task] = &[Task::Html, Task::Fonts];

fn main() -> ExitCode {
    pretty_env_logger::init();

    let args: Args = clap::Parser::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Failures that abort the build have been logged already.
            if !e.is::<Aborted>() {
                log::error!("{e:?}");
            }
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = config::load(&args.config)?;
    let policy = FailurePolicy::from(args.mode);

    let tasks: &[Task] = match args.tasks.is_empty() {
        true => ALL_TASKS,
        false => &args.tasks,
    };

    for task in tasks {
        match task {
            Task::Html => build_html(&config, policy)?,
            Task::Fonts => {
                fonts::run(&config.fonts, policy)?;
            }
        }
    }

    Ok(())
}

fn build_html(config: &Config, policy: FailurePolicy) -> anyhow::Result<()> {
    let mut builder = templater::Builder::new();
    templater::register_extensions(&mut builder)?;
    let templater = builder.load_dir(&config.templates, &config.template_extensions)?;

    let summary = html::run(&config.html, &config.data, &templater, policy)?;
    match summary.failed {
        0 => log::info!("successfully rendered {} pages", summary.rendered),
        failed => log::warn!(
            "rendered {} pages, {failed} failed to render",
            summary.rendered
        ),
    }
    Ok(())
}
