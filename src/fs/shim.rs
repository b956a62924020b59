//! Compatibility shim for legacy-dialect scripts.
//!
//! Legacy scripts declare `main` and `getParameterDefinitions` as plain
//! functions and expect the old global API. The shim prepends a prelude that
//! pulls that API from the compat module and appends the exports the worker
//! looks for.

use once_cell::sync::Lazy;
use regex::Regex;

/// First line of every shimmed script
pub const SHIM_MARKER: &str = "// cadrun: legacy shim";

static MAIN_FN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:async\s+)?function\s+main\s*\(").expect("static regex"));
static PARAM_DEFS_FN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*function\s+getParameterDefinitions\s*\(").expect("static regex")
});
static HAS_EXPORTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"module\.exports|\bexport\s").expect("static regex"));

/// Whether `path` carries the legacy extension (without the dot).
pub fn is_legacy(path: &str, extension: &str) -> bool {
    path.rsplit_once('.').is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(extension))
}

pub fn is_shimmed(source: &str) -> bool {
    source.starts_with(SHIM_MARKER)
}

/// Wrap a legacy script. Applying it to an already shimmed script is a no-op.
pub fn legacy_shim(source: &str, compat_module: &str) -> String {
    if is_shimmed(source) {
        return source.to_string();
    }

    let mut out = String::with_capacity(source.len() + 256);
    out.push_str(SHIM_MARKER);
    out.push('\n');
    out.push_str(&format!(
        "const {{ CSG, CAG, ...compat }} = require('{}')\nObject.assign(globalThis, compat)\n",
        compat_module
    ));
    out.push_str(source);
    if !source.ends_with('\n') {
        out.push('\n');
    }

    if !HAS_EXPORTS.is_match(source) {
        let mut exported = Vec::new();
        if MAIN_FN.is_match(source) {
            exported.push("main");
        }
        if PARAM_DEFS_FN.is_match(source) {
            exported.push("getParameterDefinitions");
        }
        if !exported.is_empty() {
            out.push_str(&format!("module.exports = {{ {} }}\n", exported.join(", ")));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPAT: &str = "@jscad/csg";

    #[test]
    fn test_exports_detected_functions() {
        let src = "function getParameterDefinitions() { return [] }\nfunction main(params) {\n  return cube()\n}";
        let shimmed = legacy_shim(src, COMPAT);

        assert!(shimmed.starts_with(SHIM_MARKER));
        assert!(shimmed.contains("require('@jscad/csg')"));
        assert!(shimmed.contains(src));
        assert!(shimmed.ends_with("module.exports = { main, getParameterDefinitions }\n"));
    }

    #[test]
    fn test_existing_exports_kept() {
        let src = "function main() {}\nmodule.exports = { main }\n";
        let shimmed = legacy_shim(src, COMPAT);
        assert_eq!(shimmed.matches("module.exports").count(), 1);
    }

    #[test]
    fn test_idempotent() {
        let once = legacy_shim("function main() {}", COMPAT);
        assert_eq!(legacy_shim(&once, COMPAT), once);
    }

    #[test]
    fn test_is_legacy() {
        assert!(is_legacy("/model.jscad", "jscad"));
        assert!(is_legacy("/MODEL.JSCAD", "jscad"));
        assert!(!is_legacy("/model.js", "jscad"));
        assert!(!is_legacy("/jscad", "jscad"));
    }
}
