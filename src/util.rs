use ::{
    anyhow::Context as _,
    std::{
        env,
        error::Error,
        fmt::{self, Display, Formatter},
        fs,
        path::{Component, Path, PathBuf},
    },
};

pub(crate) fn write_file<P: AsRef<Path>, D: AsRef<[u8]>>(path: P, data: D) -> anyhow::Result<()> {
    let path = path.as_ref();
    make_parents(path)?;
    fs::write(path, data)
        .with_context(|| format!("couldn't write asset to `{}`", path.display()))?;

    Ok(())
}

pub(crate) fn make_parents<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create dir `{}`", parent.display()))?;
    }
    Ok(())
}

/// `path` joined onto the current directory, unless it is already absolute.
pub(crate) fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }
    let cwd = env::current_dir().context("couldn't get current directory")?;
    if path.as_os_str().is_empty() {
        return Ok(cwd);
    }
    Ok(cwd.join(path))
}

/// Render a relative path with forward slashes, as used for template names and URLs.
pub(crate) fn to_slash(path: &Path) -> anyhow::Result<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        let part = match component {
            Component::Normal(part) => part
                .to_str()
                .with_context(|| format!("path `{}` is not valid UTF-8", path.display()))?,
            Component::ParentDir => "..",
            Component::CurDir => continue,
            Component::RootDir | Component::Prefix(_) => {
                anyhow::bail!("path `{}` is not relative", path.display())
            }
        };
        parts.push(part);
    }
    Ok(parts.join("/"))
}

/// A build was stopped after a failure that has already been reported.
#[derive(Debug)]
pub(crate) struct Aborted;

impl Display for Aborted {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("build aborted")
    }
}

impl Error for Aborted {}

#[cfg(test)]
mod tests {
    use super::to_slash;
    use std::path::Path;

    #[test]
    fn slashes() {
        assert_eq!(to_slash(Path::new("")).unwrap(), "");
        assert_eq!(to_slash(Path::new("a/./b.html")).unwrap(), "a/b.html");
        assert_eq!(to_slash(Path::new("../..")).unwrap(), "../..");
        assert!(to_slash(Path::new("/a")).is_err());
    }
}
