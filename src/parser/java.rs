use std::collections::HashMap;
use std::sync::LazyLock;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::{Captures, Regex};

use super::{basename, ensure_not_empty, FilePattern, ManifestParser, ParseOutput};
use crate::error::ParseError;
use crate::models::{DependencyRecord, Ecosystem, Scope};
use crate::version;

const SUPPORTED_FILES: &[FilePattern] = &[
    FilePattern::Exact("pom.xml"),
    FilePattern::Exact("build.gradle"),
    FilePattern::Exact("build.gradle.kts"),
];

/// Default `groupId` of Maven plugins that omit one.
const DEFAULT_PLUGIN_GROUP: &str = "org.apache.maven.plugins";

/// Nesting limit when expanding `${...}` references.
const MAX_PROPERTY_EXPANSIONS: usize = 32;

/// `implementation 'g:a:v'`, `implementation("g:a:v")`, `api platform('g:a:v')`
static GRADLE_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(\w+)\s*\(?\s*(?:(?:platform|enforcedPlatform)\s*\(\s*)?["']([^"'\s:]+):([^"'\s:]+)(?::([^"'\s]*))?["']"#,
    )
    .expect("static regex")
});

/// `implementation group: 'g', name: 'a', version: 'v'` and the Kotlin `=` form.
static GRADLE_MAP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(\w+)\s*\(?\s*group\s*[:=]\s*["']([^"']+)["']\s*,\s*name\s*[:=]\s*["']([^"']+)["'](?:\s*,\s*version\s*[:=]\s*["']([^"']*)["'])?"#,
    )
    .expect("static regex")
});

/// Parser for Java/Kotlin projects managed by Maven or Gradle.
///
/// Records are named `groupId:artifactId`.
pub struct MavenParser;

impl MavenParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MavenParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestParser for MavenParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Maven
    }

    fn supported_files(&self) -> &'static [FilePattern] {
        SUPPORTED_FILES
    }

    fn parse(&self, content: &str, filename: &str) -> Result<ParseOutput, ParseError> {
        ensure_not_empty(content)?;
        if basename(filename) == "pom.xml" {
            parse_pom_xml(content, filename)
        } else {
            Ok(parse_build_gradle(content, filename))
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum EntryKind {
    Dependency,
    Plugin,
}

/// A `<dependency>` or `<plugin>` element collected before properties are known.
struct PomEntry {
    kind: EntryKind,
    depth: usize,
    group_id: String,
    artifact_id: String,
    version: String,
    scope: String,
}

impl PomEntry {
    fn new(kind: EntryKind, depth: usize) -> Self {
        Self {
            kind,
            depth,
            group_id: String::new(),
            artifact_id: String::new(),
            version: String::new(),
            scope: String::new(),
        }
    }
}

/// Parse `pom.xml` using the quick-xml event API.
///
/// Properties may be declared after the dependencies that use them, so
/// entries are collected first and `${...}` references resolved at the end.
fn parse_pom_xml(content: &str, filename: &str) -> Result<ParseOutput, ParseError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<PomEntry> = None;
    let mut entries: Vec<PomEntry> = Vec::new();
    let mut properties: HashMap<String, String> = HashMap::new();
    let mut saw_root = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                if !saw_root {
                    check_root(&name)?;
                    saw_root = true;
                }
                stack.push(name);

                if current.is_none() {
                    if let Some(kind) = entry_kind(&stack) {
                        current = Some(PomEntry::new(kind, stack.len()));
                    }
                }
            }
            Event::Empty(ref e) if !saw_root => {
                let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                check_root(&name)?;
                saw_root = true;
            }
            Event::Text(ref e) => {
                let text = e.unescape()?.trim().to_string();
                let Some(tag) = stack.last() else {
                    continue;
                };

                if let Some(entry) = current.as_mut().filter(|c| stack.len() == c.depth + 1) {
                    match tag.as_str() {
                        "groupId" => entry.group_id = text,
                        "artifactId" => entry.artifact_id = text,
                        "version" => entry.version = text,
                        "scope" => entry.scope = text,
                        _ => {}
                    }
                    continue;
                }

                match stack_path(&stack).as_slice() {
                    ["project", "properties", key] => {
                        properties.insert(key.to_string(), text);
                    }
                    ["project", "version"] => {
                        properties.insert("project.version".to_string(), text);
                    }
                    ["project", "groupId"] => {
                        properties.insert("project.groupId".to_string(), text);
                    }
                    ["project", "parent", "version"] => {
                        properties.insert("project.parent.version".to_string(), text);
                    }
                    _ => {}
                }
            }
            Event::End(_) => {
                if current.as_ref().is_some_and(|c| c.depth == stack.len()) {
                    entries.extend(current.take());
                }
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(ParseError::schema("pom.xml has no root element"));
    }
    if !stack.is_empty() {
        return Err(ParseError::validation("invalid XML: unclosed element at end of document"));
    }

    // A child project inherits its version from <parent> when it declares none
    if !properties.contains_key("project.version") {
        if let Some(parent_version) = properties.get("project.parent.version").cloned() {
            properties.insert("project.version".to_string(), parent_version);
        }
    }

    let mut out = ParseOutput::default();
    for entry in entries {
        if entry.artifact_id.is_empty() {
            out.skip(filename, &entry.group_id, "missing artifactId");
            continue;
        }
        let group_id = match (entry.kind, entry.group_id.is_empty()) {
            (EntryKind::Plugin, true) => DEFAULT_PLUGIN_GROUP.to_string(),
            _ => resolve_properties(&entry.group_id, &properties).unwrap_or(entry.group_id),
        };
        let version = resolve_properties(&entry.version, &properties)
            .map(|v| version::maven(&v))
            .unwrap_or_default();
        let scope = match entry.kind {
            EntryKind::Plugin => Scope::Build,
            EntryKind::Dependency if entry.scope == "test" => Scope::Test,
            EntryKind::Dependency => Scope::Runtime,
        };
        out.push(DependencyRecord::new(
            Ecosystem::Maven,
            coordinate_name(&group_id, &entry.artifact_id),
            version,
            scope,
            true,
            filename,
        ));
    }

    Ok(out)
}

fn check_root(name: &str) -> Result<(), ParseError> {
    if name != "project" {
        return Err(ParseError::schema(format!(
            "root element is <{name}>, expected <project>"
        )));
    }
    Ok(())
}

fn stack_path(stack: &[String]) -> Vec<&str> {
    stack.iter().map(String::as_str).collect()
}

/// Whether the element just pushed opens a dependency or a build plugin.
///
/// Entries under `dependencyManagement` and `pluginManagement` only pin
/// versions and are not dependencies of the project. Dependencies declared
/// inside a plugin belong to the plugin.
fn entry_kind(stack: &[String]) -> Option<EntryKind> {
    let path = stack_path(stack);
    let inside = |tag: &str| path.contains(&tag);
    match path.as_slice() {
        [.., "dependencies", "dependency"]
            if !inside("dependencyManagement") && !inside("plugin") =>
        {
            Some(EntryKind::Dependency)
        }
        [.., "build", "plugins", "plugin"] if !inside("pluginManagement") => {
            Some(EntryKind::Plugin)
        }
        _ => None,
    }
}

/// Expand `${name}` references. `None` when any reference is unknown.
fn resolve_properties(value: &str, properties: &HashMap<String, String>) -> Option<String> {
    let mut resolved = value.to_string();
    for _ in 0..MAX_PROPERTY_EXPANSIONS {
        let Some(start) = resolved.find("${") else {
            return Some(resolved);
        };
        let end = start + resolved[start..].find('}')?;
        let key = &resolved[start + 2..end];
        let replacement = properties.get(key)?;
        resolved.replace_range(start..=end, replacement);
    }
    None
}

fn coordinate_name(group_id: &str, artifact_id: &str) -> String {
    if group_id.is_empty() {
        artifact_id.to_string()
    } else {
        format!("{group_id}:{artifact_id}")
    }
}

/// Parse `build.gradle` or `build.gradle.kts` line by line with regex.
fn parse_build_gradle(content: &str, filename: &str) -> ParseOutput {
    let mut out = ParseOutput::default();

    for line in content.lines() {
        if line.trim_start().starts_with("//") {
            continue;
        }
        let Some(caps) = GRADLE_MAP.captures(line).or_else(|| GRADLE_STRING.captures(line))
        else {
            continue;
        };
        if let Some(record) = gradle_record(&caps, filename, &mut out) {
            out.push(record);
        }
    }

    out
}

fn gradle_record(caps: &Captures, filename: &str, out: &mut ParseOutput) -> Option<DependencyRecord> {
    let configuration = &caps[1];
    let name = coordinate_name(&caps[2], &caps[3]);
    let raw_version = caps.get(4).map(|m| m.as_str()).unwrap_or_default();
    if raw_version.is_empty() {
        out.skip(filename, &name, "coordinates have no version");
        return None;
    }

    // `g:a:v:classifier` and `g:a:v@aar`
    let raw_version = raw_version.split([':', '@']).next().unwrap_or(raw_version);
    let version = if raw_version.contains('$') {
        String::new()
    } else {
        version::maven(raw_version)
    };

    Some(DependencyRecord::new(
        Ecosystem::Maven,
        name,
        version,
        configuration_scope(configuration),
        true,
        filename,
    ))
}

/// Map a Gradle configuration name to a scope.
fn configuration_scope(configuration: &str) -> Scope {
    match configuration {
        c if c.starts_with("test") || c.starts_with("androidTest") => Scope::Test,
        "annotationProcessor" | "kapt" | "ksp" | "classpath" | "compileOnly" | "compileOnlyApi" => {
            Scope::Build
        }
        _ => Scope::Runtime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POM: &str = r#"<?xml version="1.0"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <modelVersion>4.0.0</modelVersion>
  <groupId>com.example</groupId>
  <artifactId>app</artifactId>
  <version>1.4.0</version>
  <dependencyManagement>
    <dependencies>
      <dependency>
        <groupId>org.slf4j</groupId>
        <artifactId>slf4j-bom</artifactId>
        <version>2.0.9</version>
      </dependency>
    </dependencies>
  </dependencyManagement>
  <dependencies>
    <dependency>
      <groupId>org.apache.commons</groupId>
      <artifactId>commons-lang3</artifactId>
      <version>${commons.version}</version>
    </dependency>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>4.13.2</version>
      <scope>test</scope>
    </dependency>
    <dependency>
      <groupId>com.example</groupId>
      <artifactId>core</artifactId>
      <version>${project.version}</version>
      <scope>provided</scope>
    </dependency>
    <dependency>
      <groupId>org.unknown</groupId>
      <artifactId>mystery</artifactId>
      <version>${missing.version}</version>
    </dependency>
    <dependency>
      <groupId>org.broken</groupId>
    </dependency>
  </dependencies>
  <build>
    <plugins>
      <plugin>
        <artifactId>maven-compiler-plugin</artifactId>
        <version>3.11.0</version>
        <dependencies>
          <dependency>
            <groupId>org.ow2.asm</groupId>
            <artifactId>asm</artifactId>
            <version>9.5</version>
          </dependency>
        </dependencies>
      </plugin>
    </plugins>
  </build>
  <properties>
    <commons.version>3.12.0</commons.version>
  </properties>
</project>"#;

    fn find<'a>(out: &'a ParseOutput, name: &str) -> &'a DependencyRecord {
        out.records.iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_parse_pom_xml() {
        let out = MavenParser::new().parse(POM, "pom.xml").unwrap();
        assert_eq!(out.records.len(), 5);
        assert_eq!(out.skipped, 1);

        let lang = find(&out, "org.apache.commons:commons-lang3");
        assert_eq!(lang.version, "3.12.0");
        assert_eq!(lang.purl, "pkg:maven/org.apache.commons:commons-lang3@3.12.0");
        assert!(lang.has_scope(Scope::Runtime));

        assert!(find(&out, "junit:junit").has_scope(Scope::Test));

        let core = find(&out, "com.example:core");
        assert_eq!(core.version, "1.4.0");
        assert!(core.has_scope(Scope::Runtime));

        assert_eq!(find(&out, "org.unknown:mystery").version, "");

        let plugin = find(&out, "org.apache.maven.plugins:maven-compiler-plugin");
        assert_eq!(plugin.version, "3.11.0");
        assert!(plugin.has_scope(Scope::Build));

        assert!(!out.records.iter().any(|r| r.name.contains("slf4j-bom")));
        assert!(!out.records.iter().any(|r| r.name.contains("asm")));
    }

    #[test]
    fn test_pom_wrong_root_is_schema_error() {
        let err = MavenParser::new()
            .parse("<settings><mirrors/></settings>", "pom.xml")
            .unwrap_err();
        assert!(matches!(err, ParseError::Schema { .. }));
    }

    #[test]
    fn test_pom_malformed_is_validation_error() {
        let err = MavenParser::new()
            .parse("<project><dependencies></project>", "pom.xml")
            .unwrap_err();
        assert!(matches!(err, ParseError::Validation { .. }));
    }

    #[test]
    fn test_resolve_properties_nested() {
        let properties = HashMap::from([
            ("a".to_string(), "${b}".to_string()),
            ("b".to_string(), "2.0".to_string()),
        ]);
        assert_eq!(resolve_properties("${a}", &properties).as_deref(), Some("2.0"));
        assert_eq!(resolve_properties("plain", &properties).as_deref(), Some("plain"));
        assert_eq!(resolve_properties("${c}", &properties), None);
    }

    #[test]
    fn test_parse_build_gradle() {
        let content = r#"
plugins {
    id 'java'
    id 'org.springframework.boot' version '3.1.0'
}

dependencies {
    implementation 'org.springframework:spring-core:5.3.23'
    implementation "com.google.guava:guava:31.1-jre"
    implementation platform('org.springframework.boot:spring-boot-dependencies:3.1.0')
    implementation 'org.springframework.boot:spring-boot-starter-web'
    testImplementation 'junit:junit:4.13.2'
    annotationProcessor 'org.projectlombok:lombok:1.18.28'
    runtimeOnly group: 'org.postgresql', name: 'postgresql', version: '42.6.0'
    // implementation 'commented:out:1.0'
}
"#;
        let out = MavenParser::new().parse(content, "build.gradle").unwrap();
        assert_eq!(out.records.len(), 6);
        assert_eq!(out.skipped, 1);
        assert_eq!(out.records[0].name, "org.springframework:spring-core");
        assert_eq!(out.records[0].version, "5.3.23");
        assert!(find(&out, "junit:junit").has_scope(Scope::Test));
        assert!(find(&out, "org.projectlombok:lombok").has_scope(Scope::Build));
        assert_eq!(find(&out, "org.postgresql:postgresql").version, "42.6.0");
        assert!(find(&out, "org.postgresql:postgresql").has_scope(Scope::Runtime));
    }

    #[test]
    fn test_parse_build_gradle_kts() {
        let content = r#"
dependencies {
    implementation("io.ktor:ktor-server-core:2.3.4")
    kapt("com.google.dagger:dagger-compiler:2.48")
    testImplementation("io.mockk:mockk:1.13.8")
    implementation("com.example:lib:$libVersion")
}
"#;
        let out = MavenParser::new().parse(content, "build.gradle.kts").unwrap();
        assert_eq!(out.records.len(), 4);
        assert!(out.records[1].has_scope(Scope::Build));
        assert!(out.records[2].has_scope(Scope::Test));
        assert_eq!(out.records[3].version, "");
    }
}
