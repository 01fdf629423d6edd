//! Runtime modules embedded into packaged script bundles.
//!
//! Builtins are addressed by string module ids and emitted by the script
//! packager on demand; they never pass through the resolver or the workers.

pub(crate) const BUNDLE_LOADER: &str = "satchel/bundle-loader";
pub(crate) const JS_LOADER: &str = "satchel/loaders/js";
pub(crate) const CSS_LOADER: &str = "satchel/loaders/css";
pub(crate) const HMR_RUNTIME: &str = "satchel/hmr-runtime";
pub(crate) const CSS_RELOAD: &str = "satchel/css-reload";

/// Placeholder replaced with the configured public URL.
pub(crate) const PUBLIC_URL_PLACEHOLDER: &str = "__SATCHEL_PUBLIC_URL__";
/// Placeholder replaced with the live-update endpoint.
pub(crate) const HMR_URL_PLACEHOLDER: &str = "__SATCHEL_HMR_URL__";

const PRELUDE: &str = include_str!("prelude.js");
const PRELUDE_MIN: &str = include_str!("prelude.min.js");

/// Opening of the module registry, up to and including the first `{`.
pub(crate) fn prelude(minify: bool) -> &'static str {
    if minify { PRELUDE_MIN } else { PRELUDE }
}

/// Whether `specifier` names a builtin module.
pub(crate) fn is_builtin(specifier: &str) -> bool {
    source(specifier).is_some()
}

/// Source of a builtin module.
pub(crate) fn source(id: &str) -> Option<&'static str> {
    match id {
        BUNDLE_LOADER => Some(include_str!("bundle-loader.js")),
        JS_LOADER => Some(include_str!("loaders/js.js")),
        CSS_LOADER => Some(include_str!("loaders/css.js")),
        HMR_RUNTIME => Some(include_str!("hmr-runtime.js")),
        CSS_RELOAD => Some(include_str!("css-reload.js")),
        _ => None,
    }
}

/// Builtin modules a builtin requires itself.
pub(crate) fn dependencies(id: &str) -> &'static [&'static str] {
    match id {
        CSS_RELOAD => &[BUNDLE_LOADER],
        _ => &[],
    }
}
