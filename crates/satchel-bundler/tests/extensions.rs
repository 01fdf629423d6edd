//! Custom packagers and source dialects registered on a session.

mod helpers;

use std::sync::Arc;

use async_trait::async_trait;
use helpers::Project;
use satchel_bundler::packager::{BundleWriter, PackageContext};
use satchel_bundler::{
    AssetContext, AssetError, AssetType, Bundler, NodeIdx, Packager, Result, SourceTransform,
};

/// Writes one line per asset: its file name.
struct ManifestPackager;

#[async_trait]
impl Packager for ManifestPackager {
    async fn add_asset(
        &mut self,
        cx: &PackageContext<'_>,
        out: &mut BundleWriter,
        asset: NodeIdx,
    ) -> Result<()> {
        let path = &cx.graph.node(asset).path;
        let name = path.file_name().unwrap().to_string_lossy();
        out.write_str(&format!("{name}\n")).await
    }
}

#[tokio::test]
async fn custom_packagers_replace_builtin_ones() {
    let project = Project::with_files(&[
        ("index.css", "@import './a.css';\nbody {}\n"),
        ("a.css", "a {}\n"),
    ]);
    let mut bundler = Bundler::builder(project.options(&["index.css"]))
        .packager(AssetType::Css, || Box::new(ManifestPackager))
        .build()
        .unwrap();

    bundler.bundle().await.unwrap();
    assert_eq!(project.output("index.css"), "a.css\nindex.css\n");
}

#[tokio::test]
async fn dialects_compile_before_the_inner_type_runs() {
    let project = Project::with_files(&[
        ("index.js", "module.exports = require('./greeting.txt');\n"),
        ("greeting.txt", "hello"),
    ]);
    let transform: Arc<dyn SourceTransform> = Arc::new(
        |source: String, _cx: &AssetContext<'_>| -> std::result::Result<String, AssetError> {
            Ok(format!("module.exports = {:?};\n", source.trim()))
        },
    );
    let mut bundler = Bundler::builder(project.options(&["index.js"]))
        .dialect("txt", "js", transform)
        .build()
        .unwrap();

    let report = bundler.bundle().await.unwrap();
    assert_eq!(report.bundles.len(), 1);
    assert!(project.output("index.js").contains("module.exports = \"hello\";"));
}
