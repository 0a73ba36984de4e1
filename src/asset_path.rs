//! `{{assets "img/logo.png"}}`: path to an asset relative to the page being rendered.

use ::{
    handlebars::{Context, Handlebars, Helper, HelperDef, RenderContext, RenderError, ScopedJson},
    serde_json::Value as Json,
};

pub(crate) const NAME: &str = "assets";

#[derive(Clone, Copy)]
pub(crate) struct AssetPath;

impl HelperDef for AssetPath {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        _: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'reg, 'rc>, RenderError> {
        let path = h
            .param(0)
            .and_then(|param| param.value().as_str())
            .ok_or_else(|| RenderError::new(format!("`{NAME}` expects an asset path")))?;
        let prefix = ctx
            .data()
            .pointer("/file/prefix")
            .and_then(Json::as_str)
            .unwrap_or("");
        Ok(ScopedJson::Derived(Json::String(join(prefix, path))))
    }
}

/// Join two forward-slash paths and normalize the result, the same way POSIX `path.join` does.
pub(crate) fn join(base: &str, path: &str) -> String {
    let joined = match (base.is_empty(), path.is_empty()) {
        (true, _) => path.to_owned(),
        (false, true) => base.to_owned(),
        (false, false) => format!("{base}/{path}"),
    };
    normalize(&joined)
}

fn normalize(path: &str) -> String {
    if path.is_empty() {
        return ".".to_owned();
    }

    let absolute = path.starts_with('/');
    let trailing_slash = path.ends_with('/');

    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                // Can't go above the root.
                _ if absolute => {}
                _ => segments.push(".."),
            },
            _ => segments.push(segment),
        }
    }

    let mut normalized = segments.join("/");
    if absolute {
        normalized.insert(0, '/');
    }
    if normalized.is_empty() {
        normalized.push('.');
    }
    if trailing_slash && !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}
