//! `{{includePretty "path/to/template.html"}}`: renders another template in place, indented to
//! the column the tag was written at.
//!
//! Handlebars' own partials only indent standalone `{{> partial}}` lines. This directive works
//! anywhere on a line and also trims the result, so that the first line lines up with whatever
//! precedes the tag and the last line doesn't leave a stray newline behind.

pub(crate) const TAG: &str = "includePretty";

/// Hash argument that carries the indentation from parse time to render time.
const INDENT: &str = "indent";

#[derive(Clone, Copy)]
pub(crate) struct IncludePretty;

impl Directive for IncludePretty {
    fn keyword(&self) -> &'static str {
        TAG
    }

    fn expand(&self, source: &str) -> Result<String, ParseError> {
        let tags = directive::scan(source, TAG)?;
        if tags.is_empty() {
            return Ok(source.to_owned());
        }

        let mut output = String::with_capacity(source.len() + tags.len() * " indent=0".len());
        let mut copied = 0;
        for tag in tags {
            let arguments = &tag.signature.arguments;
            if !matches!(arguments.first(), Some(Argument::Positional(_))) {
                return Err(ParseError::new(
                    TAG,
                    tag.keyword,
                    ParseErrorKind::MissingTemplate,
                ));
            }
            if arguments
                .iter()
                .any(|argument| matches!(argument, Argument::Hash { key, .. } if *key == INDENT))
            {
                return Err(ParseError::new(
                    TAG,
                    tag.keyword,
                    ParseErrorKind::ReservedArgument(INDENT),
                ));
            }

            let close = tag.signature.close.offset();
            output.push_str(&source[copied..close]);
            output.push_str(&format!(" {INDENT}={}", tag.indent));
            copied = close;
        }
        output.push_str(&source[copied..]);

        Ok(output)
    }
}

impl HelperDef for IncludePretty {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let name = h
            .param(0)
            .and_then(|param| param.value().as_str())
            .ok_or_else(|| {
                RenderError::new(format!("`{TAG}` expects a template path as its first argument"))
            })?;

        let width = h
            .hash_get(INDENT)
            .and_then(|width| width.value().as_u64())
            .and_then(|width| usize::try_from(width).ok())
            .unwrap_or(0);

        // The included template sees the same variables as the one including it, plus any extra
        // hash arguments.
        let mut vars = ctx.data().clone();
        if vars.is_null() {
            vars = Json::Object(Map::new());
        }
        if let Json::Object(vars) = &mut vars {
            for (&key, value) in h.hash() {
                if key != INDENT {
                    vars.insert(key.to_owned(), value.value().clone());
                }
            }
        }

        let _frame = IncludeFrame::enter(name)?;
        let rendered = r.render(name, &vars)?;
        out.write(&pretty(&rendered, width))?;
        Ok(())
    }
}

/// Deepest include nesting allowed before rendering gives up. Templates may include themselves
/// as long as the recursion ends.
const MAX_DEPTH: usize = 16;

thread_local! {
    /// Templates currently being included, outermost first.
    static INCLUDES: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

/// Marks `name` as being included until dropped.
struct IncludeFrame;

impl IncludeFrame {
    fn enter(name: &str) -> Result<Self, RenderError> {
        INCLUDES.with(|includes| {
            let mut includes = includes.borrow_mut();
            if includes.len() >= MAX_DEPTH {
                let chain = includes
                    .iter()
                    .map(String::as_str)
                    .chain([name])
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(RenderError::new(format!(
                    "`{TAG}` nested more than {MAX_DEPTH} deep: {chain}"
                )));
            }
            includes.push(name.to_owned());
            Ok(Self)
        })
    }
}

impl Drop for IncludeFrame {
    fn drop(&mut self) {
        INCLUDES.with(|includes| {
            includes.borrow_mut().pop();
        });
    }
}

/// Indent every line of `rendered` by `width` spaces, then trim both ends.
pub(crate) fn pretty(rendered: &str, width: usize) -> String {
    if width == 0 {
        return rendered.trim().to_owned();
    }
    indent(rendered, width).trim().to_owned()
}

fn indent(text: &str, width: usize) -> String {
    if text.is_empty() {
        return String::new();
    }
    let padding = " ".repeat(width);
    let mut indented = String::with_capacity(text.len() + width * text.lines().count());
    for (i, line) in text.split('\n').enumerate() {
        if i != 0 {
            indented.push('\n');
        }
        indented.push_str(&padding);
        indented.push_str(line);
    }
    indented
}

#[cfg(test)]
mod tests {
    #[test]
    fn appends_indent() {
        let expand = |src: &str| IncludePretty.expand(src).unwrap();

        assert_eq!(expand("<p>no tags</p>"), "<p>no tags</p>");
        assert_eq!(
            expand("  {{includePretty \"a.html\"}}"),
            "  {{includePretty \"a.html\" indent=2}}"
        );
        assert_eq!(
            expand("<ul>\n    {{~includePretty \"a\" title=\"x\" ~}}\n</ul>"),
            "<ul>\n    {{~includePretty \"a\" title=\"x\"  indent=4~}}\n</ul>"
        );
        assert_eq!(
            expand("{{includePretty \"a\"}}{{includePretty \"b\"}}"),
            "{{includePretty \"a\" indent=0}}{{includePretty \"b\" indent=0}}"
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        let kind = |src: &str| IncludePretty.expand(src).unwrap_err().kind().to_string();

        assert_eq!(
            kind("{{includePretty}}"),
            ParseErrorKind::MissingTemplate.to_string()
        );
        assert_eq!(
            kind("{{includePretty title=\"x\"}}"),
            ParseErrorKind::MissingTemplate.to_string()
        );
        assert_eq!(
            kind("{{includePretty \"a\" indent=3}}"),
            ParseErrorKind::ReservedArgument(INDENT).to_string()
        );
    }

    #[test]
    fn indents_then_trims() {
        assert_eq!(
            pretty("<li>a</li>\n<li>b</li>\n", 4),
            "<li>a</li>\n    <li>b</li>"
        );
        assert_eq!(pretty("a\n\nb\n", 2), "a\n  \n  b");
        assert_eq!(pretty("\n  a\nb  \n\n", 0), "a\nb");
        assert_eq!(pretty("single\n", 8), "single");
        assert_eq!(pretty("", 3), "");
    }

    use super::{pretty, IncludePretty, INDENT};
    use crate::directive::ParseErrorKind;
    use crate::templater::Directive as _;
}

use crate::directive::{self, Argument, ParseError, ParseErrorKind};
use crate::templater::Directive;
use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, RenderError,
};
use serde_json::{Map, Value as Json};
use std::cell::RefCell;
