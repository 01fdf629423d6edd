use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::{Asset, AssetContext, AssetError, AssetType, Dependency, Generated, ParseState};
use crate::diagnostics::line_column;

/// Tags whose `src`/`href`/`poster` attributes reference other files.
static REFERENCING_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)<(script|link|img|a|iframe|source|video|audio|embed)\b[^>]*>").ok()
});

static URL_ATTRIBUTE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s(?:src|href|poster)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).ok()
});

#[derive(Debug, Clone)]
struct Reference {
    value: String,
    /// Span of the attribute value, quotes included.
    span: Range<usize>,
    /// Anchors only count when they point at a file.
    anchor: bool,
}

/// An HTML document.
///
/// Every local file referenced from a tag attribute becomes a URL dependency
/// (its own bundle) and the attribute is rewritten to that bundle's public URL.
pub struct HtmlAsset {
    source: String,
    state: ParseState,
    references: Option<Vec<Reference>>,
    edits: Vec<(Range<usize>, String)>,
}

impl Default for HtmlAsset {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlAsset {
    pub fn new() -> Self {
        Self {
            source: String::new(),
            state: ParseState::Unparsed,
            references: None,
            edits: Vec::new(),
        }
    }
}

impl Asset for HtmlAsset {
    fn asset_type(&self) -> AssetType {
        AssetType::Html
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn set_source(&mut self, source: String) {
        self.source = source;
        self.state = ParseState::Unparsed;
        self.references = None;
        self.edits.clear();
    }

    fn parse_state(&self) -> ParseState {
        self.state
    }

    fn parse(&mut self, _cx: &AssetContext<'_>) -> Result<(), AssetError> {
        let mut references = Vec::new();

        let (Some(tags), Some(attributes)) = (REFERENCING_TAG.as_ref(), URL_ATTRIBUTE.as_ref())
        else {
            self.references = Some(references);
            self.state = ParseState::Parsed;
            return Ok(());
        };

        for tag in tags.captures_iter(&self.source) {
            let (Some(whole), Some(name)) = (tag.get(0), tag.get(1)) else {
                continue;
            };
            let anchor = name.as_str().eq_ignore_ascii_case("a");

            for attr in attributes.captures_iter(whole.as_str()) {
                let Some(value) = (1..=3).find_map(|i| attr.get(i)) else {
                    continue;
                };
                // widen to include the quotes, if any
                let quoted = attr.get(3).is_none();
                let start = whole.start() + value.start() - usize::from(quoted);
                let end = whole.start() + value.end() + usize::from(quoted);
                references.push(Reference {
                    value: value.as_str().to_string(),
                    span: start..end,
                    anchor,
                });
            }
        }

        self.references = Some(references);
        self.state = ParseState::Parsed;
        Ok(())
    }

    fn collect_dependencies(
        &mut self,
        cx: &AssetContext<'_>,
    ) -> Result<Vec<Dependency>, AssetError> {
        let Some(references) = self.references.as_ref() else {
            return Ok(Vec::new());
        };
        let mut deps = Vec::new();
        let mut edits = Vec::new();

        for reference in references {
            let Some(target) = cx.url_target(&reference.value) else {
                continue;
            };
            if reference.anchor && Path::new(&target).extension().is_none() {
                continue;
            }

            let public = cx.public_url_for(&target);
            let loc = line_column(&self.source, reference.span.start);
            deps.push(Dependency::url(&reference.value, target).at(loc));
            edits.push((reference.span.clone(), format!("\"{public}\"")));
        }

        if !edits.is_empty() {
            self.edits = edits;
            self.state.mark_dirty();
        }
        Ok(deps)
    }

    fn generate(&mut self, _cx: &AssetContext<'_>) -> Result<Generated, AssetError> {
        let html = if self.state == ParseState::Dirty {
            self.edits.sort_by_key(|(span, _)| span.start);
            let mut out = String::with_capacity(self.source.len());
            let mut cursor = 0;
            for (span, text) in &self.edits {
                if span.start < cursor {
                    continue;
                }
                out.push_str(self.source.get(cursor..span.start).unwrap_or_default());
                out.push_str(text);
                cursor = span.end;
            }
            out.push_str(self.source.get(cursor..).unwrap_or_default());
            out
        } else {
            self.source.clone()
        };

        let mut generated = Generated::new();
        generated.insert(AssetType::Html, html);
        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use crate::asset::{AssetType, test_support};
    use crate::runtime::MemoryRuntime;

    const PAGE: &str = r#"<!doctype html>
<html>
<head><link rel="stylesheet" href="./style.css"></head>
<body>
  <img src='img/logo.png' alt="logo">
  <a href="https://example.com">external</a>
  <a href="/about">route</a>
  <a href="./about.html">about</a>
  <script src="./index.js"></script>
</body>
</html>
"#;

    #[test]
    fn local_references_become_url_dependencies() {
        let runtime = MemoryRuntime::new().with_file("/app/index.html", PAGE);
        let out = test_support::run(&runtime, &test_support::options(), "/app/index.html").unwrap();

        let specs: Vec<_> = out.dependencies.iter().map(|d| d.specifier.as_str()).collect();
        assert_eq!(
            specs,
            ["./style.css", "img/logo.png", "./about.html", "./index.js"]
        );
        assert!(out.dependencies.iter().all(|d| d.dynamic && d.meta.is_url));
    }

    #[test]
    fn attributes_are_rewritten_to_public_urls() {
        let runtime = MemoryRuntime::new().with_file("/app/index.html", PAGE);
        let options = test_support::options().public_url("/static/");
        let out = test_support::run(&runtime, &options, "/app/index.html").unwrap();
        let html = out.output(&AssetType::Html).unwrap();

        assert!(html.contains(r#"href="/static/style."#));
        assert!(html.contains(r#"<img src="/static/logo."#));
        assert!(html.contains(r#"href="/static/about.html""#));
        assert!(html.contains(r#"<script src="/static/index."#));
        assert!(html.contains(r#"href="https://example.com""#));
        assert!(html.contains(r#"href="/about""#));
    }

    #[test]
    fn documents_without_references_pass_through() {
        let page = "<html><body><p>hi</p></body></html>";
        let runtime = MemoryRuntime::new().with_file("/app/plain.html", page);
        let out = test_support::run(&runtime, &test_support::options(), "/app/plain.html").unwrap();

        assert!(out.dependencies.is_empty());
        assert_eq!(out.output(&AssetType::Html), Some(page));
    }
}
