//! Renders every page to HTML.

/// Name failures are reported under.
pub(crate) const PLUGIN: &str = "handlebars";

/// Where the page being rendered lives, as seen by its template through `file`.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct RenderContext {
    path: PathBuf,
    relative: String,
    base: PathBuf,
    /// Relative path from the page's directory back up to `base`.
    prefix: String,
}

impl RenderContext {
    pub(crate) fn new(path: &Path, base: &Path) -> anyhow::Result<Self> {
        let path = absolute(path)?;
        let base = absolute(base)?;

        let relative = path.strip_prefix(&base).with_context(|| {
            format!(
                "failed to strip prefix {} from {}",
                base.display(),
                path.display()
            )
        })?;
        let depth = relative.components().count().saturating_sub(1);
        let prefix = vec![".."; depth].join("/");
        let relative = to_slash(relative)?;

        Ok(Self {
            path,
            relative,
            base,
            prefix,
        })
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Summary {
    pub(crate) rendered: usize,
    pub(crate) failed: usize,
}

pub(crate) fn run(
    config: &config::Html,
    data: &Map<String, Json>,
    templater: &Templater,
    policy: FailurePolicy,
) -> anyhow::Result<Summary> {
    let base = config.src.base();
    let mut summary = Summary::default();

    for path in config.src.files()? {
        match render_page(&path, &base, &config.dest, data, templater) {
            Ok(output) => {
                log::info!("successfully emitted {}", output.display());
                summary.rendered += 1;
            }
            Err(e) => {
                summary.failed += 1;
                policy.handle(e)?;
            }
        }
    }

    Ok(summary)
}

#[context("{}: failed to render `{}`", PLUGIN, path.display())]
fn render_page(
    path: &Path,
    base: &Path,
    dest: &Path,
    data: &Map<String, Json>,
    templater: &Templater,
) -> anyhow::Result<PathBuf> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    let file = RenderContext::new(path, base)?;

    #[derive(Serialize)]
    struct TemplateVars<'a> {
        #[serde(flatten)]
        data: &'a Map<String, Json>,
        file: &'a RenderContext,
    }
    let html = templater.render(&source, TemplateVars { data, file: &file })?;

    let output = output_path(dest, &file.relative);
    write_file(&output, html)?;
    Ok(output)
}

fn output_path(dest: &Path, relative: &str) -> PathBuf {
    let mut output = dest.join(relative);
    output.set_extension("html");
    output
}


use crate::config::{self, FailurePolicy};
use crate::templater::Templater;
use crate::util::{absolute, to_slash, write_file};
use anyhow::Context as _;
use fn_error_context::context;
use serde::Serialize;
use serde_json::{Map, Value as Json};
use std::fs;
use std::path::{Path, PathBuf};
