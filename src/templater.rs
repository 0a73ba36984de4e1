use crate::{
    asset_path::{self, AssetPath},
    directive::ParseError,
    include_pretty::IncludePretty,
    util::to_slash,
};
use ::{
    anyhow::{ensure, Context as _},
    fn_error_context::context,
    handlebars::{template::Template, Handlebars, HelperDef, Renderable as _},
    serde::Serialize,
    std::{collections::HashSet, ffi::OsStr, fs, path::Path, rc::Rc},
    walkdir::WalkDir,
};

/// A custom tag. Besides the helper that runs it, a directive gets to rewrite template source
/// before handlebars compiles it.
pub(crate) trait Directive {
    fn keyword(&self) -> &'static str;

    /// Rewrite every occurrence of the directive into a plain helper call.
    fn expand(&self, source: &str) -> Result<String, ParseError>;
}

/// Collects extensions. Templates are only loaded once registration is finished.
pub(crate) struct Builder {
    handlebars: Handlebars<'static>,
    directives: Vec<Box<dyn Directive>>,
    names: HashSet<String>,
}

impl Builder {
    pub(crate) fn new() -> Self {
        Self {
            handlebars: Handlebars::new(),
            directives: Vec::new(),
            names: HashSet::new(),
        }
    }

    pub(crate) fn add_tag<T>(&mut self, tag: T) -> anyhow::Result<()>
    where
        T: Directive + HelperDef + Clone + Send + Sync + 'static,
    {
        let keyword = tag.keyword();
        self.claim(keyword)?;
        self.handlebars.register_helper(keyword, Box::new(tag.clone()));
        self.directives.push(Box::new(tag));
        Ok(())
    }

    pub(crate) fn add_filter<F>(&mut self, name: &str, filter: F) -> anyhow::Result<()>
    where
        F: HelperDef + Send + Sync + 'static,
    {
        self.claim(name)?;
        self.handlebars.register_helper(name, Box::new(filter));
        Ok(())
    }

    fn claim(&mut self, name: &str) -> anyhow::Result<()> {
        ensure!(
            self.names.insert(name.to_owned()),
            "`{name}` is already registered"
        );
        Ok(())
    }

    /// Finish registration and compile every template under `dir` with one of `extensions`.
    ///
    /// Templates are named by their path relative to `dir`. Ones that fail to compile are skipped;
    /// including one of them later is a render error.
    #[context("failed to load templates from `{}`", dir.display())]
    pub(crate) fn load_dir(mut self, dir: &Path, extensions: &[String]) -> anyhow::Result<Templater> {
        let mut loaded = 0_usize;

        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let is_template = path
                .extension()
                .and_then(OsStr::to_str)
                .map_or(false, |ext| extensions.iter().any(|e| e == ext));
            if !is_template {
                continue;
            }

            let name = to_slash(path.strip_prefix(dir)?)?;
            let res = fs::read_to_string(path)
                .with_context(|| format!("failed to read `{}`", path.display()))
                .and_then(|source| Ok(expand(&self.directives, &source)?))
                .and_then(|source| Ok(self.handlebars.register_template_string(&name, source)?));
            match res {
                Ok(()) => loaded += 1,
                // Pages are templates too and get reported again when they are rendered, so this
                // is only logged in detail.
                Err(e) => log::debug!("{:?}", e.context(format!("skipping template `{name}`"))),
            }
        }

        log::debug!("loaded {loaded} templates from `{}`", dir.display());

        Ok(Templater {
            handlebars: Rc::new(self.handlebars),
            directives: Rc::from(self.directives),
        })
    }
}

/// Register the site's custom tags and filters.
pub(crate) fn register_extensions(builder: &mut Builder) -> anyhow::Result<()> {
    builder.add_tag(IncludePretty)?;
    builder.add_filter(asset_path::NAME, AssetPath)?;
    Ok(())
}

/// The finished template environment; read-only.
#[derive(Clone)]
pub(crate) struct Templater {
    handlebars: Rc<Handlebars<'static>>,
    directives: Rc<[Box<dyn Directive>]>,
}

impl Templater {
    /// Compile and render `source` against the loaded templates.
    pub(crate) fn render(&self, source: &str, vars: impl Serialize) -> anyhow::Result<String> {
        let source = expand(&self.directives, source)?;
        let template = Template::compile(&source)?;

        let context = handlebars::Context::wraps(vars)?;
        let mut render_context = handlebars::RenderContext::new(None);
        Ok(template.renders(&*self.handlebars, &context, &mut render_context)?)
    }
}

fn expand(directives: &[Box<dyn Directive>], source: &str) -> Result<String, ParseError> {
    let mut source = source.to_owned();
    for directive in directives {
        source = directive.expand(&source)?;
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::{register_extensions, Builder, Templater};
    use crate::{asset_path::AssetPath, include_pretty::IncludePretty};
    use serde_json::json;
    use std::{fs, path::Path};

    fn templater(dir: &Path) -> Templater {
        let mut builder = Builder::new();
        register_extensions(&mut builder).unwrap();
        builder
            .load_dir(dir, &["html".to_owned(), "hbs".to_owned()])
            .unwrap()
    }

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn rejects_duplicates() {
        let mut builder = Builder::new();
        register_extensions(&mut builder).unwrap();
        assert!(builder.add_tag(IncludePretty).is_err());
        assert!(builder.add_filter("assets", AssetPath).is_err());
        assert!(builder.add_filter("includePretty", AssetPath).is_err());
        assert!(builder.add_filter("other", AssetPath).is_ok());
    }

    #[test]
    fn includes_pretty() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "partials/items.hbs", "<li>{{a}}</li>\n<li>{{b}}</li>\n");
        write(dir.path(), "partials/raw.html", "<b>&amp; {{title}}</b>\n");
        write(dir.path(), "notes.txt", "{{includePretty}}");
        let templater = templater(dir.path());

        let page = "<ul>\n    {{includePretty \"partials/items.hbs\" b=\"two\"}}\n</ul>\n";
        assert_eq!(
            templater.render(page, json!({ "a": "one" })).unwrap(),
            "<ul>\n    <li>one</li>\n    <li>two</li>\n</ul>\n"
        );

        let page = "<p>{{includePretty \"partials/raw.html\"}}</p>";
        assert_eq!(
            templater.render(page, json!({ "title": "<i>" })).unwrap(),
            "<p><b>&amp; &lt;i&gt;</b></p>"
        );
    }

    #[test]
    fn nested_includes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "inner.html", "<i>a</i>\n<i>b</i>\n");
        write(
            dir.path(),
            "outer.html",
            "<div>\n  {{includePretty \"inner.html\"}}\n</div>\n",
        );
        let templater = templater(dir.path());

        let page = "<main>\n  {{includePretty \"outer.html\"}}\n</main>";
        assert_eq!(
            templater.render(page, json!({})).unwrap(),
            "<main>\n  <div>\n    <i>a</i>\n    <i>b</i>\n  </div>\n</main>"
        );
    }

    #[test]
    fn asset_paths() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "head.html", "<link href=\"{{assets \"css/site.css\"}}\">");
        let templater = templater(dir.path());

        let vars = json!({ "file": { "prefix": "../.." } });
        assert_eq!(
            templater
                .render("<img src=\"{{assets \"img/logo.png\"}}\">", &vars)
                .unwrap(),
            "<img src=\"../../img/logo.png\">"
        );
        assert_eq!(
            templater
                .render("{{includePretty \"head.html\"}}", &vars)
                .unwrap(),
            "<link href=\"../../css/site.css\">"
        );
        assert_eq!(
            templater.render("{{assets \"a.png\"}}", json!({})).unwrap(),
            "a.png"
        );
    }

    #[test]
    fn recursive_includes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "loop.html", "x{{includePretty \"loop.html\"}}");
        write(dir.path(), "ping.html", "{{includePretty \"pong.html\"}}");
        write(dir.path(), "pong.html", "{{includePretty \"ping.html\"}}");
        write(
            dir.path(),
            "tree.html",
            "{{name}}{{#each children}}\n{{includePretty \"tree.html\" name=name children=children}}{{/each}}",
        );
        let templater = templater(dir.path());

        let e = templater
            .render("{{includePretty \"loop.html\"}}", json!({}))
            .unwrap_err();
        let message = format!("{e:#}");
        assert!(message.contains("nested more than 16 deep"), "{message}");
        assert!(message.contains("loop.html -> loop.html"), "{message}");

        let e = templater
            .render("{{includePretty \"ping.html\"}}", json!({}))
            .unwrap_err();
        assert!(format!("{e:#}").contains("ping.html -> pong.html"));

        // Recursion that ends is fine, and failed renders leave nothing behind.
        let tree = json!({
            "name": "a",
            "children": [{ "name": "b", "children": [{ "name": "c", "children": [] }] }],
        });
        assert_eq!(
            templater
                .render("{{includePretty \"tree.html\"}}", &tree)
                .unwrap(),
            "a\nb\nc"
        );
    }

    #[test]
    fn missing_template() {
        let dir = tempfile::tempdir().unwrap();
        let templater = templater(dir.path());

        let e = templater
            .render("{{includePretty \"partials/missing.html\"}}", json!({}))
            .unwrap_err();
        assert!(format!("{e:#}").contains("partials/missing.html"));
    }

    #[test]
    fn skips_broken_templates() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.html", "{{#if}}");
        write(dir.path(), "bad-directive.html", "{{includePretty}}");
        write(dir.path(), "fine.html", "fine");
        let templater = templater(dir.path());

        assert_eq!(
            templater
                .render("{{includePretty \"fine.html\"}}", json!({}))
                .unwrap(),
            "fine"
        );
        assert!(templater
            .render("{{includePretty \"bad-directive.html\"}}", json!({}))
            .is_err());
        assert!(templater.render("{{includePretty 'x'", json!({})).is_err());
    }
}
