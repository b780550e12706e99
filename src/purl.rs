//! Package URL generation.
//!
//! `pkg:<ecosystem>/<name>@<version>`, or `pkg:<ecosystem>/<name>` when the
//! version is empty. Inputs are not percent-encoded, so names containing
//! reserved PURL characters produce a deterministic but non-conformant string.

use crate::models::Ecosystem;

pub fn generate(ecosystem: Ecosystem, name: &str, version: &str) -> String {
    if version.is_empty() {
        format!("pkg:{}/{}", ecosystem.as_str(), name)
    } else {
        format!("pkg:{}/{}@{}", ecosystem.as_str(), name, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_with_version() {
        assert_eq!(generate(Ecosystem::Cargo, "tokio", "1.25"), "pkg:cargo/tokio@1.25");
        assert_eq!(
            generate(Ecosystem::Npm, "@types/node", "20.1.0"),
            "pkg:npm/@types/node@20.1.0"
        );
    }

    #[test]
    fn test_generate_without_version_has_no_trailing_at() {
        assert_eq!(generate(Ecosystem::Go, "example.com/local", ""), "pkg:go/example.com/local");
    }

    #[test]
    fn test_generate_is_deterministic() {
        let a = generate(Ecosystem::Maven, "junit:junit", "4.13.2");
        let b = generate(Ecosystem::Maven, "junit:junit", "4.13.2");
        assert_eq!(a, b);
    }
}
