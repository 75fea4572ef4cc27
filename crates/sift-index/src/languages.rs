//! File eligibility rules and content-class detection.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Extensions (lowercase, without the dot) eligible for indexing.
const ALLOWED_EXTENSIONS: &[&str] = &[
    // source
    "rs", "py", "pyi", "js", "jsx", "mjs", "cjs", "ts", "tsx", "mts", "cts", "go", "java", "kt",
    "kts", "scala", "groovy", "c", "h", "cc", "cpp", "cxx", "hpp", "hh", "cs", "fs", "rb", "php",
    "swift", "m", "mm", "lua", "dart", "ex", "exs", "erl", "hrl", "hs", "ml", "mli", "clj",
    "cljs", "r", "jl", "pl", "pm", "zig", "nim", "sol", "vue", "svelte",
    // shell and build
    "sh", "bash", "zsh", "fish", "ps1", "bat", "cmake", "mk", "gradle", "bazel", "bzl", "nix",
    "tf", "hcl",
    // markup, styles, data
    "html", "htm", "css", "scss", "sass", "less", "xml", "json", "jsonc", "yaml", "yml", "toml",
    "ini", "cfg", "conf", "sql", "graphql", "gql", "proto", "thrift",
    // prose
    "md", "markdown", "mdx", "rst", "txt", "adoc",
];

/// Extensionless file names (lowercase) eligible for indexing.
const ALLOWED_FILE_NAMES: &[&str] = &[
    "makefile",
    "dockerfile",
    "jenkinsfile",
    "vagrantfile",
    "gemfile",
    "rakefile",
    "procfile",
    "brewfile",
    "justfile",
    "license",
    "readme",
    "changelog",
];

/// Path fragments (lowercase) marking vendored, generated, or fixture content.
const DENIED_PATH_FRAGMENTS: &[&str] = &[
    "/.git/",
    "/node_modules/",
    "/vendor/",
    "/third_party/",
    "/fixtures/",
    "/__fixtures__/",
    "/testdata/",
    "/__tests__/",
    "/__snapshots__/",
    "/__mocks__/",
    "/dist/",
    "/target/",
    ".min.",
    "/package-lock.json",
];

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "mdx"];

/// Retrieval partition a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentClass {
    Code,
    Markdown,
}

impl ContentClass {
    /// Classify by extension alone; anything that is not markdown is code.
    #[must_use]
    pub fn of(file_path: &str) -> Self {
        match lowercase_extension(Path::new(file_path)) {
            Some(ext) if MARKDOWN_EXTENSIONS.contains(&ext.as_str()) => Self::Markdown,
            _ => Self::Code,
        }
    }

    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Markdown => "markdown",
        }
    }
}

impl std::fmt::Display for ContentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Whether the file's extension (or, without one, its name) is on the allow-list.
#[must_use]
pub fn has_allowed_type(path: &Path) -> bool {
    match lowercase_extension(path) {
        Some(ext) => ALLOWED_EXTENSIONS.contains(&ext.as_str()),
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| ALLOWED_FILE_NAMES.contains(&n.to_ascii_lowercase().as_str())),
    }
}

/// Whether `rel_path` (relative to the codebase root, `/`-separated) hits the deny-list.
///
/// Fragments are matched against `/` plus the root-relative path rather than the
/// absolute path, so a checkout that itself lives under e.g. `/vendor/` is still indexed.
#[must_use]
pub fn is_denied(rel_path: &str) -> bool {
    let haystack = format!("/{}", rel_path.trim_start_matches('/')).to_ascii_lowercase();
    DENIED_PATH_FRAGMENTS.iter().any(|f| haystack.contains(f))
}

/// Combined eligibility check used by the chunker.
#[must_use]
pub fn is_indexable(rel_path: &str) -> bool {
    has_allowed_type(Path::new(rel_path)) && !is_denied(rel_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_extensions_allowed() {
        for p in ["src/main.rs", "app.py", "web/index.TSX", "cmd/server.go", "Lib.Java"] {
            assert!(has_allowed_type(Path::new(p)), "expected {p} to be allowed");
        }
    }

    #[test]
    fn unknown_extensions_rejected() {
        assert!(!has_allowed_type(Path::new("image.png")));
        assert!(!has_allowed_type(Path::new("Cargo.lock")));
        assert!(!has_allowed_type(Path::new("archive.tar.gz")));
    }

    #[test]
    fn extensionless_files_match_by_name() {
        assert!(has_allowed_type(Path::new("Makefile")));
        assert!(has_allowed_type(Path::new("docker/Dockerfile")));
        assert!(!has_allowed_type(Path::new("bin/run")));
        assert!(!has_allowed_type(Path::new(".gitignore")));
    }

    #[test]
    fn deny_list_is_case_insensitive_substring() {
        assert!(is_denied("vendor/lib/a.go"));
        assert!(is_denied("pkg/Vendor/a.go"));
        assert!(is_denied("web/node_modules/react/index.js"));
        assert!(is_denied("tests/Fixtures/sample.rs"));
        assert!(is_denied("static/app.min.js"));
        assert!(!is_denied("src/vendored.rs"));
        assert!(!is_denied("src/lib.rs"));
    }

    #[test]
    fn indexable_requires_both_rules() {
        assert!(is_indexable("src/lib.rs"));
        assert!(!is_indexable("testdata/lib.rs"));
        assert!(!is_indexable("src/logo.svg"));
    }

    #[test]
    fn content_class_by_extension() {
        assert_eq!(ContentClass::of("README.md"), ContentClass::Markdown);
        assert_eq!(ContentClass::of("docs/guide.MDX"), ContentClass::Markdown);
        assert_eq!(ContentClass::of("docs/notes.markdown"), ContentClass::Markdown);
        assert_eq!(ContentClass::of("src/main.rs"), ContentClass::Code);
        assert_eq!(ContentClass::of("notes.txt"), ContentClass::Code);
        assert_eq!(ContentClass::of("Makefile"), ContentClass::Code);
    }

    #[test]
    fn content_class_display() {
        assert_eq!(ContentClass::Code.to_string(), "code");
        assert_eq!(ContentClass::Markdown.to_string(), "markdown");
    }
}
