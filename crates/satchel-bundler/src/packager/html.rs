use async_trait::async_trait;

use super::{BundleWriter, PackageContext, Packager};
use crate::Result;
use crate::asset::AssetType;
use crate::graph::NodeIdx;

/// Writes documents, injecting the stylesheets and scripts extracted from
/// the bundles they reference.
///
/// A page referencing `index.js` that imports CSS gets a
/// `<link rel="stylesheet">` for the extracted sibling in its `<head>`,
/// unless the page already references that URL.
#[derive(Debug, Default)]
pub struct HtmlPackager;

impl HtmlPackager {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Packager for HtmlPackager {
    async fn add_asset(
        &mut self,
        cx: &PackageContext<'_>,
        out: &mut BundleWriter,
        asset: NodeIdx,
    ) -> Result<()> {
        let Some(html) = cx
            .processed(asset)
            .and_then(|processed| processed.output(&AssetType::Html))
        else {
            return Ok(());
        };

        let tags = sibling_tags(cx, html);
        out.write_str(&inject_into_head(html, &tags)).await
    }
}

fn sibling_tags(cx: &PackageContext<'_>, html: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for &child in &cx.bundle.children {
        for &sibling in cx.tree.bundle(child).siblings.values() {
            let bundle = cx.tree.bundle(sibling);
            if bundle.is_empty() {
                continue;
            }
            let url = cx.bundle_url(sibling);
            if html.contains(&format!("\"{url}\"")) {
                continue;
            }
            match bundle.bundle_type {
                AssetType::Css => tags.push(format!("<link rel=\"stylesheet\" href=\"{url}\">")),
                AssetType::Js => tags.push(format!("<script src=\"{url}\"></script>")),
                _ => {}
            }
        }
    }
    tags
}

/// Insert `tags` at the end of `<head>`, creating the element when missing.
fn inject_into_head(html: &str, tags: &[String]) -> String {
    if tags.is_empty() {
        return html.to_string();
    }
    let block = tags.join("\n");
    // ASCII lowercasing keeps byte offsets
    let lower = html.to_ascii_lowercase();

    if let Some(pos) = lower.find("</head>") {
        return format!("{}{block}\n{}", &html[..pos], &html[pos..]);
    }

    let insert_at = lower
        .find("<html")
        .and_then(|start| lower[start..].find('>').map(|end| start + end + 1))
        .unwrap_or(0);
    format!(
        "{}<head>\n{block}\n</head>{}",
        &html[..insert_at],
        &html[insert_at..]
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::asset::Dependency;
    use crate::bundle::build_bundle_tree;
    use crate::graph::{AssetGraph, DepTarget, ModuleIds};
    use crate::options::BundlerOptions;
    use crate::packager::package_bundle;
    use crate::packager::test_support::{asset, link};

    #[test]
    fn tags_go_before_the_closing_head() {
        let html = "<html><HEAD><title>x</title></HEAD><body></body></html>";
        let out = inject_into_head(html, &["<link>".to_string()]);
        assert_eq!(
            out,
            "<html><HEAD><title>x</title><link>\n</HEAD><body></body></html>"
        );
    }

    #[test]
    fn a_head_is_created_when_missing() {
        let out = inject_into_head("<html lang=\"en\"><body></body></html>", &["<a>".to_string()]);
        assert_eq!(out, "<html lang=\"en\"><head>\n<a>\n</head><body></body></html>");

        let out = inject_into_head("<p>fragment</p>", &["<a>".to_string()]);
        assert_eq!(out, "<head>\n<a>\n</head><p>fragment</p>");
    }

    #[tokio::test]
    async fn extracted_stylesheets_are_linked() {
        let dir = TempDir::new().unwrap();
        let mut graph = AssetGraph::new();
        let page = asset(
            &mut graph,
            "/app/index.html",
            AssetType::Html,
            &[(AssetType::Html, "<html><head></head><body><script src=\"/app.abc.js\"></script></body></html>")],
        );
        let script = asset(&mut graph, "/app/app.js", AssetType::Js, &[(AssetType::Js, "require('./app.css');")]);
        let style = asset(
            &mut graph,
            "/app/app.css",
            AssetType::Css,
            &[(AssetType::Css, "a {}"), (AssetType::Js, "")],
        );
        link(
            &mut graph,
            page,
            Dependency::url("./app.js", "/app/app.js".into()),
            DepTarget::Asset(script),
        );
        link(&mut graph, script, Dependency::new("./app.css"), DepTarget::Asset(style));
        graph.set_entries(vec![page]);

        let options = BundlerOptions::new(["/app/index.html"])
            .root_dir("/app")
            .out_dir(dir.path());
        let mut ids = ModuleIds::new();
        let tree = build_bundle_tree(&graph, &mut ids, Path::new("/app"));
        let root = tree.bundle(tree.roots()[0]);
        let script_bundle = tree.bundle(tree.child_for(root.id, script).unwrap());
        let css_name = tree.bundle(script_bundle.siblings[&AssetType::Css]).name.clone();

        let cx = PackageContext {
            bundle: root,
            tree: &tree,
            graph: &graph,
            ids: &ids,
            options: &options,
        };
        package_bundle(&cx, &mut HtmlPackager::new()).await.unwrap();

        let html = std::fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert!(html.contains(&format!("<link rel=\"stylesheet\" href=\"/{css_name}\">\n</head>")));
        assert_eq!(html.matches("<script").count(), 1);
    }
}
