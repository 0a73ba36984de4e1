use crate::util::{absolute, Aborted};
use ::{
    anyhow::{anyhow, Context as _},
    fn_error_context::context,
    glob::{MatchOptions, Pattern},
    serde::Deserialize,
    serde_json::{Map, Value as Json},
    std::{
        convert::Infallible,
        fs, io,
        path::{Path, PathBuf},
        str::FromStr,
    },
};

/// Global config shared by the entire program.
#[derive(Debug)]
pub(crate) struct Config {
    /// Where templates are looked up by name.
    pub templates: PathBuf,

    /// Files in `templates` with these extensions are loaded as templates.
    pub template_extensions: Vec<String>,

    /// Variables available to every page.
    pub data: Map<String, Json>,

    pub html: Html,

    pub fonts: Fonts,
}

#[derive(Debug)]
pub(crate) struct Html {
    pub src: Sources,
    pub dest: PathBuf,
}

#[derive(Debug)]
pub(crate) struct Fonts {
    pub src: Sources,
    pub dest: PathBuf,
}

/// Load the config file at `path`, falling back to the defaults if it doesn't exist.
///
/// Relative paths in the file are relative to the directory it is in.
#[context("failed to load config from `{}`", path.display())]
pub(crate) fn load(path: &Path) -> anyhow::Result<Config> {
    let root = absolute(path.parent().unwrap_or_else(|| Path::new("")))?;
    match fs::read_to_string(path) {
        Ok(text) => parse(&text, &root),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!("no config file at `{}`, using defaults", path.display());
            Ok(ConfigFile::default().resolve(&root))
        }
        Err(e) => Err(anyhow!(e).context("failed to read config file")),
    }
}

pub(crate) fn parse(text: &str, root: &Path) -> anyhow::Result<Config> {
    let file: ConfigFile = toml::from_str(text).context("failed to parse config file")?;
    Ok(file.resolve(root))
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    templates: PathBuf,
    template_extensions: Vec<String>,
    data: Map<String, Json>,
    html: HtmlFile,
    fonts: FontsFile,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            templates: PathBuf::from("src"),
            template_extensions: vec!["html".to_owned(), "hbs".to_owned()],
            data: Map::new(),
            html: HtmlFile::default(),
            fonts: FontsFile::default(),
        }
    }
}

impl ConfigFile {
    fn resolve(self, root: &Path) -> Config {
        Config {
            templates: root.join(self.templates),
            template_extensions: self.template_extensions,
            data: self.data,
            html: Html {
                src: Sources::new(root, self.html.src, self.html.exclude),
                dest: root.join(self.html.dest),
            },
            fonts: Fonts {
                src: Sources::new(root, self.fonts.src, Vec::new()),
                dest: root.join(self.fonts.dest),
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HtmlFile {
    src: String,
    exclude: Vec<String>,
    dest: PathBuf,
}

impl Default for HtmlFile {
    fn default() -> Self {
        Self {
            src: "src/**/*.html".to_owned(),
            exclude: vec!["src/partials/**".to_owned()],
            dest: PathBuf::from("dist"),
        }
    }
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FontsFile {
    src: String,
    dest: PathBuf,
}

impl Default for FontsFile {
    fn default() -> Self {
        Self {
            src: "src/fonts/**/*".to_owned(),
            dest: PathBuf::from("dist/fonts"),
        }
    }
}

/// Files matched by an include glob and none of the exclude globs.
#[derive(Debug, Clone)]
pub(crate) struct Sources {
    root: PathBuf,
    include: String,
    exclude: Vec<String>,
}

impl Sources {
    pub(crate) fn new(root: &Path, include: String, exclude: Vec<String>) -> Self {
        Self {
            root: root.to_owned(),
            include,
            exclude,
        }
    }

    /// The directory matched files are relative to: everything in the include glob before its
    /// first wildcard.
    pub(crate) fn base(&self) -> PathBuf {
        self.root.join(glob_base(&self.include))
    }

    /// Every matched file, sorted.
    #[context("failed to expand glob `{}`", self.include)]
    pub(crate) fn files(&self) -> anyhow::Result<Vec<PathBuf>> {
        let exclude = self
            .exclude
            .iter()
            .map(|pattern| {
                // Accept gulp-style negated globs.
                let pattern = pattern.strip_prefix('!').unwrap_or(pattern);
                Pattern::new(&self.pattern(pattern))
                    .with_context(|| format!("invalid exclude glob `{pattern}`"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut files = Vec::new();
        for path in glob::glob_with(&self.pattern(&self.include), MATCH_OPTIONS)? {
            let path = path?;
            if !path.is_file() {
                continue;
            }
            if exclude
                .iter()
                .any(|pattern| pattern.matches_path_with(&path, MATCH_OPTIONS))
            {
                log::debug!("excluding {}", path.display());
                continue;
            }
            files.push(path);
        }
        files.sort();
        Ok(files)
    }

    fn pattern(&self, pattern: &str) -> String {
        if Path::new(pattern).is_absolute() {
            return pattern.to_owned();
        }
        let root = Pattern::escape(&self.root.to_string_lossy());
        format!("{}/{pattern}", root.trim_end_matches('/'))
    }
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

fn glob_base(pattern: &str) -> PathBuf {
    let is_magic = |part: &str| part.contains(|c: char| matches!(c, '*' | '?' | '[' | '{'));
    let parts: Vec<&str> = pattern.split('/').collect();
    match parts.iter().position(|&part| is_magic(part)) {
        Some(magic) => parts[..magic].iter().collect(),
        // A plain file path; its base is the directory it is in.
        None => parts[..parts.len().saturating_sub(1)].iter().collect(),
    }
}

/// Build mode, which decides what happens when a file fails to build.
///
/// Only `production` is strict; any other mode name is a development build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuildMode {
    Development,
    Production,
}

impl FromStr for BuildMode {
    type Err = Infallible;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        Ok(match mode {
            "production" => Self::Production,
            _ => Self::Development,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailurePolicy {
    /// Stop at the first failure and exit with a non-zero status.
    AbortProcess,
    /// Log failures and carry on with the remaining files.
    LogAndContinue,
}

impl From<BuildMode> for FailurePolicy {
    fn from(mode: BuildMode) -> Self {
        match mode {
            BuildMode::Development => Self::LogAndContinue,
            BuildMode::Production => Self::AbortProcess,
        }
    }
}

impl FailurePolicy {
    /// Report a failed file. Returns an error if the run has to stop.
    pub(crate) fn handle(self, error: anyhow::Error) -> anyhow::Result<()> {
        log::error!("{error:?}");
        match self {
            Self::LogAndContinue => Ok(()),
            Self::AbortProcess => Err(Aborted.into()),
        }
    }
}
