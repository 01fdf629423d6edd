//! Rebuilds within a session and cache reuse across sessions.

mod helpers;

use helpers::{Project, packaged_names};
use satchel_bundler::{Bundler, Error};

fn chain() -> Project {
    Project::with_files(&[
        ("index.js", "require('./a');\n"),
        ("a.js", "module.exports = require('./b');\n"),
        ("b.js", "module.exports = 'first';\n"),
    ])
}

#[tokio::test]
async fn rebuild_only_reprocesses_changed_files() {
    let project = chain();
    let mut bundler = project.bundler(&["index.js"]);
    assert_eq!(bundler.bundle().await.unwrap().processed, 3);

    project.write("b.js", "module.exports = 'second';\n");
    let report = bundler.rebuild([project.path("b.js")]).await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(packaged_names(&report), ["index.js"]);
    let output = project.output("index.js");
    assert!(output.contains("'second'"));
    assert!(!output.contains("'first'"));
}

#[tokio::test]
async fn unrelated_paths_do_not_trigger_work() {
    let project = chain();
    let mut bundler = project.bundler(&["index.js"]);
    bundler.bundle().await.unwrap();

    project.write("notes.txt", "scratch");
    let report = bundler.rebuild([project.path("notes.txt")]).await.unwrap();

    assert_eq!(report.processed, 0);
    assert!(packaged_names(&report).is_empty());
    assert_eq!(report.bundles.len(), 1);
}

#[tokio::test]
async fn unchanged_bundles_are_not_rewritten() {
    let project = Project::with_files(&[
        ("index.js", "import('./lazy');\n"),
        ("lazy.js", "module.exports = 1;\n"),
    ]);
    let mut bundler = project.bundler(&["index.js"]);
    bundler.bundle().await.unwrap();
    let index_before = project.output("index.js");

    project.write("lazy.js", "module.exports = 2;\n");
    let report = bundler.rebuild([project.path("lazy.js")]).await.unwrap();

    assert_eq!(packaged_names(&report), ["lazy.js"]);
    assert!(!report.bundle("index.js").unwrap().packaged);
    assert_eq!(project.output("index.js"), index_before);
    assert!(project.output("lazy.js").contains("module.exports = 2;"));
}

#[tokio::test]
async fn new_dependencies_are_discovered_on_rebuild() {
    let project = chain();
    let mut bundler = project.bundler(&["index.js"]);
    bundler.bundle().await.unwrap();

    project.write("c.js", "module.exports = 'c';\n");
    project.write("index.js", "require('./a');\nrequire('./c');\n");
    let report = bundler.rebuild([project.path("index.js")]).await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(bundler.graph().len(), 4);
    assert!(project.output("index.js").contains("module.exports = 'c';"));
}

#[tokio::test]
async fn module_ids_are_stable_across_rebuilds() {
    let project = chain();
    let mut bundler = project.bundler(&["index.js"]);
    bundler.bundle().await.unwrap();

    let b = bundler.graph().get(&project.path("b.js")).unwrap();
    let before = bundler.module_ids().get(b);

    project.write("index.js", "require('./b');\nrequire('./a');\n");
    bundler.rebuild([project.path("index.js")]).await.unwrap();

    assert_eq!(bundler.module_ids().get(b), before);
}

#[tokio::test]
async fn failed_passes_recover_once_the_file_exists() {
    let project = Project::with_files(&[("index.js", "require('./later');\n")]);
    let mut bundler = project.bundler(&["index.js"]);

    let err = bundler.bundle().await.unwrap_err();
    assert!(matches!(err, Error::Resolution { .. }));

    project.write("later.js", "module.exports = 'here now';\n");
    let report = bundler.rebuild([project.path("later.js")]).await.unwrap();

    assert_eq!(report.processed + report.cache_hits, 2);
    assert!(project.output("index.js").contains("'here now'"));
}

#[tokio::test]
async fn deleted_files_are_reported_by_their_dependents() {
    let project = chain();
    let mut bundler = project.bundler(&["index.js"]);
    bundler.bundle().await.unwrap();

    project.remove("b.js");
    let err = bundler.rebuild([project.path("b.js")]).await.unwrap_err();

    match err {
        Error::Resolution { specifier, from, .. } => {
            assert_eq!(specifier, "./b");
            assert_eq!(from, project.path("a.js"));
        }
        other => panic!("expected a resolution error, got {other}"),
    }
}

#[tokio::test]
async fn cache_is_reused_by_a_new_session() {
    let project = chain();
    {
        let mut first = project.bundler(&["index.js"]);
        first.bundle().await.unwrap();
    }
    let first_output = project.output("index.js");

    let mut second = project.bundler(&["index.js"]);
    let report = second.bundle().await.unwrap();

    assert_eq!(report.processed, 0);
    assert_eq!(report.cache_hits, 3);
    assert_eq!(project.output("index.js"), first_output);
}

#[tokio::test]
async fn changed_options_do_not_reuse_cache_entries() {
    let project = chain();
    project.bundler(&["index.js"]).bundle().await.unwrap();

    let mut production = Bundler::new(project.options(&["index.js"]).production(true)).unwrap();
    let report = production.bundle().await.unwrap();
    assert_eq!(report.cache_hits, 0);
    assert_eq!(report.processed, 3);
}

#[tokio::test]
async fn disabled_cache_writes_nothing() {
    let project = chain();
    let mut bundler = Bundler::new(project.options(&["index.js"]).cache(false)).unwrap();
    bundler.bundle().await.unwrap();

    assert!(!project.cache_dir().exists());
}
