use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::{
    Asset, AssetContext, AssetError, AssetType, Dependency, Generated, ParseState, is_external_url,
};
use crate::builtins::CSS_RELOAD;
use crate::diagnostics::line_column;

static IMPORT_RULE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?(?:"([^"]*)"|'([^']*)'|([^\s'")]+))\s*\)?[^;]*;"#).ok()
});

static URL_TOKEN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^\s'")]*))\s*\)"#).ok()
});

static COMMENT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"/\*[\s\S]*?\*/").ok());
static WHITESPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s+").ok());
static PUNCTUATION_SPACE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\s*([{}:;,>])\s*").ok());

#[derive(Debug, Clone)]
struct Reference {
    value: String,
    span: Range<usize>,
}

#[derive(Debug, Default)]
struct Structure {
    imports: Vec<Reference>,
    urls: Vec<Reference>,
}

/// A stylesheet.
///
/// Structure is found heuristically: `@import` rules become static
/// dependencies and are removed, `url(...)` references become URL
/// dependencies and are rewritten to their public URL. The generated script
/// module is empty, or a reload stub when live updates are enabled.
pub struct CssAsset {
    source: String,
    state: ParseState,
    structure: Option<Structure>,
    edits: Vec<(Range<usize>, String)>,
}

impl Default for CssAsset {
    fn default() -> Self {
        Self::new()
    }
}

impl CssAsset {
    pub fn new() -> Self {
        Self {
            source: String::new(),
            state: ParseState::Unparsed,
            structure: None,
            edits: Vec::new(),
        }
    }
}

impl Asset for CssAsset {
    fn asset_type(&self) -> AssetType {
        AssetType::Css
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn set_source(&mut self, source: String) {
        self.source = source;
        self.state = ParseState::Unparsed;
        self.structure = None;
        self.edits.clear();
    }

    fn parse_state(&self) -> ParseState {
        self.state
    }

    fn parse(&mut self, _cx: &AssetContext<'_>) -> Result<(), AssetError> {
        let mut structure = Structure::default();

        let imports = IMPORT_RULE.iter().flat_map(|re| re.captures_iter(&self.source));
        for caps in imports {
            let (Some(rule), Some(value)) = (caps.get(0), first_group(&caps)) else {
                continue;
            };
            structure.imports.push(Reference {
                value: value.to_string(),
                span: rule.range(),
            });
        }

        let urls = URL_TOKEN.iter().flat_map(|re| re.captures_iter(&self.source));
        for caps in urls {
            let (Some(token), Some(value)) = (caps.get(0), first_group(&caps)) else {
                continue;
            };
            let inside_import = structure
                .imports
                .iter()
                .any(|import| import.span.contains(&token.start()));
            if !inside_import {
                structure.urls.push(Reference {
                    value: value.to_string(),
                    span: token.range(),
                });
            }
        }

        self.structure = Some(structure);
        self.state = ParseState::Parsed;
        Ok(())
    }

    fn collect_dependencies(
        &mut self,
        cx: &AssetContext<'_>,
    ) -> Result<Vec<Dependency>, AssetError> {
        let Some(structure) = self.structure.as_ref() else {
            return Ok(Vec::new());
        };
        let mut deps = Vec::new();
        let mut edits = Vec::new();

        for import in &structure.imports {
            if is_external_url(&import.value) {
                continue;
            }
            let loc = line_column(&self.source, import.span.start);
            deps.push(Dependency::new(relative_specifier(&import.value)).at(loc));
            edits.push((import.span.clone(), String::new()));
        }

        for url in &structure.urls {
            let Some(target) = cx.url_target(&url.value) else {
                continue;
            };
            let public = cx.public_url_for(&target);
            let loc = line_column(&self.source, url.span.start);
            deps.push(Dependency::url(&url.value, target).at(loc));
            edits.push((url.span.clone(), format!("url(\"{public}\")")));
        }

        if cx.options.hmr {
            deps.push(Dependency::new(CSS_RELOAD));
        }

        if !edits.is_empty() {
            self.edits = edits;
            self.state.mark_dirty();
        }
        Ok(deps)
    }

    fn generate(&mut self, cx: &AssetContext<'_>) -> Result<Generated, AssetError> {
        let mut css = if self.state == ParseState::Dirty {
            apply(&self.source, &mut self.edits)
        } else {
            self.source.clone()
        };
        if cx.options.minify {
            css = minify(&css);
        }

        let js = if cx.options.hmr {
            format!(
                "var reloadCSS = require(\"{CSS_RELOAD}\");\nmodule.hot.dispose(reloadCSS);\nmodule.hot.accept(reloadCSS);\n"
            )
        } else {
            String::new()
        };

        let mut generated = Generated::new();
        generated.insert(AssetType::Css, css);
        generated.insert(AssetType::Js, js);
        Ok(generated)
    }
}

fn first_group<'t>(caps: &regex::Captures<'t>) -> Option<&'t str> {
    (1..caps.len())
        .find_map(|i| caps.get(i))
        .map(|m| m.as_str())
        .filter(|value| !value.is_empty())
}

/// `@import "a.css"` means `./a.css` in stylesheets.
fn relative_specifier(value: &str) -> String {
    if value.starts_with('.') || value.starts_with('/') || value.starts_with('~') {
        value.to_string()
    } else {
        format!("./{value}")
    }
}

fn apply(source: &str, edits: &mut [(Range<usize>, String)]) -> String {
    edits.sort_by_key(|(span, _)| span.start);
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for (span, text) in edits.iter() {
        if span.start < cursor {
            continue;
        }
        out.push_str(source.get(cursor..span.start).unwrap_or_default());
        out.push_str(text);
        cursor = span.end;
    }
    out.push_str(source.get(cursor..).unwrap_or_default());
    out
}

/// Strip comments and collapse whitespace.
pub(crate) fn minify(css: &str) -> String {
    let mut css = css.to_string();
    for (pattern, replacement) in [
        (&COMMENT, ""),
        (&WHITESPACE, " "),
        (&PUNCTUATION_SPACE, "$1"),
    ] {
        if let Some(re) = pattern.as_ref() {
            css = re.replace_all(&css, replacement).into_owned();
        }
    }
    css.replace(";}", "}").trim().to_string()
}
