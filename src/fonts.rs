pub(crate) fn run(config: &config::Fonts, policy: FailurePolicy) -> anyhow::Result<usize> {
    let base = config.src.base();
    let mut copied = 0;

    for src in config.src.files()? {
        match copy(&src, &base, &config.dest) {
            Ok(()) => copied += 1,
            Err(e) => policy.handle(e)?,
        }
    }

    log::info!("successfully copied {copied} fonts");
    Ok(copied)
}

fn copy(src: &Path, base: &Path, out_dir: &Path) -> anyhow::Result<()> {
    let relative = src.strip_prefix(base).with_context(|| {
        format!(
            "failed to strip prefix {} from {}",
            base.display(),
            src.display()
        )
    })?;
    let dest = out_dir.join(relative);

    make_parents(&dest)?;
    fs::copy(src, &dest)
        .with_context(|| format!("failed to copy {} to {}", src.display(), dest.display()))?;
    log::info!("Copied {} to {}", src.display(), dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn copies_fonts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for (name, contents) in [
            ("src/fonts/inter.woff2", "inter"),
            ("src/fonts/mono/iosevka.woff2", "iosevka"),
            ("src/index.html", "page"),
        ] {
            let path = root.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        let config = config::parse("", root).unwrap();
        let copied = run(&config.fonts, FailurePolicy::AbortProcess).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(
            fs::read_to_string(root.join("dist/fonts/inter.woff2")).unwrap(),
            "inter"
        );
        assert_eq!(
            fs::read_to_string(root.join("dist/fonts/mono/iosevka.woff2")).unwrap(),
            "iosevka"
        );
        assert!(!root.join("dist/fonts/index.html").exists());
    }

    #[test]
    fn no_fonts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config::parse("", dir.path()).unwrap();
        assert_eq!(run(&config.fonts, FailurePolicy::AbortProcess).unwrap(), 0);
    }

    use super::run;
    use crate::config::{self, FailurePolicy};
    use std::fs;
}

use crate::config::{self, FailurePolicy};
use crate::util::make_parents;
use anyhow::Context;
use std::fs;
use std::path::Path;
