//! Package manifest types and target resolution
//!
//! A package is a directory holding a `.kiln.yml` manifest. The manifest
//! declares build dependencies, a default `build` phase and optional named
//! `targets`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Manifest file name at the package root
pub const MANIFEST_FILE: &str = ".kiln.yml";

/// Target selected when none is named
pub const DEFAULT_TARGET: &str = "default";

/// Top-level contents of `.kiln.yml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildInstructions {
    /// Tools shared by every phase
    pub dependencies: DependencySet,
    /// Run every phase sandboxed
    pub sandbox: bool,
    /// Phase used when the manifest has no named targets
    pub build: BuildPhase,
    /// Named build phases
    pub targets: BTreeMap<String, BuildPhase>,
}

/// Tool dependencies declared at manifest level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencySet {
    /// `name:version` specs installed before any build phase
    pub build: Vec<String>,
    /// Runtime dependencies; carried for completeness, not provisioned by `build`
    pub runtime: Vec<String>,
}

/// One build phase: the commands to run and how to run them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildPhase {
    /// Run the commands inside this container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerDefinition>,
    /// `name:version` tool specs for this phase
    pub tools: Vec<String>,
    /// Shell commands, run in order
    pub commands: Vec<String>,
    /// Paths produced by the phase
    pub artifacts: Vec<String>,
    /// Run this phase sandboxed
    pub sandbox: bool,
    /// Working directory relative to the package, applied before the first command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    /// `KEY=VALUE` assignments; values may use `{PKGDIR}`
    #[serde(rename = "env")]
    pub environment: Vec<String>,
    /// Free-form labels
    pub tags: BTreeMap<String, String>,
}

impl BuildPhase {
    /// Container image, if the phase declares a non-empty one
    #[must_use]
    pub fn container_image(&self) -> Option<&str> {
        self.container
            .as_ref()
            .map(|c| c.image.trim())
            .filter(|image| !image.is_empty())
    }

    /// Whether the phase has nothing to run
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Container a phase runs in
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerDefinition {
    /// Image reference
    pub image: String,
    /// `host:container` bind mounts; relative host paths are package-relative
    pub mounts: Vec<String>,
    /// `host:container` port mappings
    pub ports: Vec<String>,
    /// `KEY=VALUE` pairs set on the container
    pub environment: Vec<String>,
    /// Keep-alive command overriding the image default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// A parsed `name:version` tool requirement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolRequirement {
    /// Registry name of the provider
    pub name: String,
    /// Requested version
    pub version: String,
}

impl ToolRequirement {
    /// Parse a `name:version` spec.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if either half is missing.
    pub fn parse(spec: &str) -> Result<Self> {
        let (name, version) = spec.trim().split_once(':').ok_or_else(|| {
            Error::configuration_with_help(
                format!("Invalid tool spec '{spec}'"),
                "Tools are written as name:version, e.g. gradle:7.6",
            )
        })?;

        let (name, version) = (name.trim(), version.trim());
        if name.is_empty() || version.is_empty() {
            return Err(Error::configuration(format!(
                "Tool spec '{spec}' needs both a name and a version"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

impl fmt::Display for ToolRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

impl BuildInstructions {
    /// Load and parse a manifest file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read and a manifest error
    /// if it is not valid YAML for this schema.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read manifest"))?;
        Self::parse(&contents, path)
    }

    /// Parse manifest contents; `path` is only used for error messages.
    ///
    /// # Errors
    ///
    /// Returns a manifest error on invalid YAML.
    pub fn parse(contents: &str, path: &Path) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|e| Error::manifest(path, e.to_string()))
    }

    /// Pick the phase for `target`.
    ///
    /// With no named targets the `build` phase is used and only
    /// [`DEFAULT_TARGET`] may be requested. With named targets the requested
    /// name (default [`DEFAULT_TARGET`]) must exist.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the valid targets, sorted.
    pub fn resolve_target(&self, target: Option<&str>) -> Result<(String, &BuildPhase)> {
        let name = target.unwrap_or(DEFAULT_TARGET);

        if self.targets.is_empty() {
            if name != DEFAULT_TARGET {
                return Err(Error::configuration_with_help(
                    format!("Build target '{name}' does not exist"),
                    "This package only defines the default build",
                ));
            }
            if self.build.is_empty() {
                tracing::warn!("Default build has no steps and no targets are described");
            }
            return Ok((name.to_string(), &self.build));
        }

        self.targets.get(name).map_or_else(
            || {
                let valid: Vec<&str> = self.targets.keys().map(String::as_str).collect();
                Err(Error::configuration_with_help(
                    format!("Build target '{name}' does not exist"),
                    format!("Valid build targets: {}", valid.join(", ")),
                ))
            },
            |phase| {
                if phase.is_empty() {
                    tracing::warn!(target = name, "Build target has no steps");
                }
                Ok((name.to_string(), phase))
            },
        )
    }

    /// Tools required by `phase`: manifest build dependencies followed by the
    /// phase's own tools, one entry per tool name with the phase winning.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed spec.
    pub fn tool_requirements(&self, phase: &BuildPhase) -> Result<Vec<ToolRequirement>> {
        let mut requirements: Vec<ToolRequirement> = Vec::new();
        for spec in self.dependencies.build.iter().chain(&phase.tools) {
            let req = ToolRequirement::parse(spec)?;
            if let Some(existing) = requirements.iter_mut().find(|r| r.name == req.name) {
                *existing = req;
            } else {
                requirements.push(req);
            }
        }
        Ok(requirements)
    }
}

/// A package located on disk together with its manifest
#[derive(Debug, Clone)]
pub struct Package {
    /// Directory name of the package
    pub name: String,
    /// Absolute package directory
    pub path: PathBuf,
    /// Parsed manifest
    pub instructions: BuildInstructions,
}

impl Package {
    /// Load the package rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` has no readable, valid manifest.
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest = dir.join(MANIFEST_FILE);
        let instructions = BuildInstructions::load(&manifest)?;
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::manifest(&manifest, "package directory has no name"))?;

        Ok(Self {
            name,
            path: dir.to_path_buf(),
            instructions,
        })
    }

    /// Find a package starting from `cwd`.
    ///
    /// Without a name, the nearest ancestor of `cwd` (inclusive) that holds a
    /// manifest. With a name, `cwd` itself if it is that package, otherwise a
    /// child or sibling directory of that name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no package is found.
    pub fn locate(cwd: &Path, name: Option<&str>) -> Result<Self> {
        let Some(name) = name else {
            let root = cwd
                .ancestors()
                .find(|dir| dir.join(MANIFEST_FILE).is_file())
                .ok_or_else(|| {
                    Error::configuration_with_help(
                        format!("No {MANIFEST_FILE} found in {} or its parents", cwd.display()),
                        "Run kiln from inside a package or name one with @package:target",
                    )
                })?;
            return Self::load(root);
        };

        let mut candidates = Vec::with_capacity(3);
        if cwd.file_name().is_some_and(|n| n == name) {
            candidates.push(cwd.to_path_buf());
        }
        candidates.push(cwd.join(name));
        if let Some(parent) = cwd.parent() {
            candidates.push(parent.join(name));
        }

        candidates
            .into_iter()
            .find(|dir| dir.join(MANIFEST_FILE).is_file())
            .map_or_else(
                || {
                    Err(Error::configuration(format!(
                        "Package '{name}' not found near {}",
                        cwd.display()
                    )))
                },
                |dir| Self::load(&dir),
            )
    }
}

/// Split a build argument into an optional package and a target.
///
/// `@package:target` names both; anything else is a target of the current
/// package.
///
/// # Errors
///
/// Returns a configuration error for `@package` without `:target`.
pub fn parse_build_arg(arg: &str) -> Result<(Option<String>, String)> {
    let Some(rest) = arg.strip_prefix('@') else {
        return Ok((None, arg.to_string()));
    };

    match rest.split_once(':') {
        Some((package, target)) if !package.is_empty() && !target.is_empty() => {
            Ok((Some(package.to_string()), target.to_string()))
        }
        _ => Err(Error::configuration_with_help(
            format!("Unable to parse package/target definition: {arg}"),
            "Use @package:target",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r"
dependencies:
  build:
    - gradle:6.8
    - maven:3.6.3
sandbox: false
targets:
  release:
    tools:
      - gradle:7.6
    commands:
      - cd app
      - ./gradlew assemble
    env:
      - OUT={PKGDIR}/out
  test:
    container:
      image: openjdk:11
      mounts:
        - data:/data
    commands:
      - ./gradlew test
";

    fn parse(contents: &str) -> BuildInstructions {
        BuildInstructions::parse(contents, Path::new(".kiln.yml")).unwrap()
    }

    #[test]
    fn test_parse_manifest() {
        let instructions = parse(MANIFEST);
        assert_eq!(instructions.dependencies.build.len(), 2);
        assert_eq!(instructions.targets.len(), 2);

        let release = &instructions.targets["release"];
        assert_eq!(release.commands, vec!["cd app", "./gradlew assemble"]);
        assert_eq!(release.environment, vec!["OUT={PKGDIR}/out"]);
        assert!(release.container_image().is_none());

        let test = &instructions.targets["test"];
        assert_eq!(test.container_image(), Some("openjdk:11"));
    }

    #[test]
    fn test_empty_manifest_is_default() {
        assert_eq!(parse("   \n"), BuildInstructions::default());
    }

    #[test]
    fn test_invalid_yaml_is_manifest_error() {
        let err = BuildInstructions::parse("targets: [", Path::new("x/.kiln.yml")).unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }));
    }

    #[test]
    fn test_resolve_named_target() {
        let instructions = parse(MANIFEST);
        let (name, phase) = instructions.resolve_target(Some("release")).unwrap();
        assert_eq!(name, "release");
        assert_eq!(phase.commands.len(), 2);
    }

    #[test]
    fn test_unknown_target_lists_valid_names_sorted() {
        let instructions = parse(MANIFEST);
        let err = instructions.resolve_target(Some("deploy")).unwrap_err();
        match err {
            Error::Configuration { message, help } => {
                assert!(message.contains("deploy"));
                assert_eq!(help.as_deref(), Some("Valid build targets: release, test"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_default_phase_without_targets() {
        let instructions = parse("build:\n  commands:\n    - make\n");
        let (name, phase) = instructions.resolve_target(None).unwrap();
        assert_eq!(name, DEFAULT_TARGET);
        assert_eq!(phase.commands, vec!["make"]);
        assert!(instructions.resolve_target(Some("other")).is_err());
    }

    #[test]
    fn test_empty_default_phase_is_not_an_error() {
        let instructions = parse("sandbox: true\n");
        let (_, phase) = instructions.resolve_target(None).unwrap();
        assert!(phase.is_empty());
    }

    #[test]
    fn test_tool_requirements_phase_wins() {
        let instructions = parse(MANIFEST);
        let phase = &instructions.targets["release"];
        let tools = instructions.tool_requirements(phase).unwrap();
        let rendered: Vec<String> = tools.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["gradle:7.6", "maven:3.6.3"]);
    }

    #[test]
    fn test_tool_requirement_parse_errors() {
        assert!(ToolRequirement::parse("gradle").is_err());
        assert!(ToolRequirement::parse(":7.6").is_err());
        assert!(ToolRequirement::parse("gradle:").is_err());
        let req = ToolRequirement::parse(" flutter:1.17.0_beta ").unwrap();
        assert_eq!(req.name, "flutter");
        assert_eq!(req.version, "1.17.0_beta");
    }

    #[test]
    fn test_parse_build_arg() {
        assert_eq!(parse_build_arg("test").unwrap(), (None, "test".to_string()));
        assert_eq!(
            parse_build_arg("@api:release").unwrap(),
            (Some("api".to_string()), "release".to_string())
        );
        assert!(parse_build_arg("@api").is_err());
        assert!(parse_build_arg("@:release").is_err());
    }

    #[test]
    fn test_locate_walks_up_to_manifest() {
        let temp = TempDir::new().unwrap();
        let pkg = temp.path().join("api");
        std::fs::create_dir_all(pkg.join("src/deep")).unwrap();
        std::fs::write(pkg.join(MANIFEST_FILE), "build:\n  commands: [make]\n").unwrap();

        let found = Package::locate(&pkg.join("src/deep"), None).unwrap();
        assert_eq!(found.name, "api");
        assert_eq!(found.path, pkg);
    }

    #[test]
    fn test_locate_named_sibling() {
        let temp = TempDir::new().unwrap();
        for name in ["api", "web"] {
            let dir = temp.path().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(MANIFEST_FILE), "").unwrap();
        }

        let found = Package::locate(&temp.path().join("api"), Some("web")).unwrap();
        assert_eq!(found.name, "web");

        let found = Package::locate(temp.path(), Some("api")).unwrap();
        assert_eq!(found.name, "api");

        assert!(Package::locate(temp.path(), Some("missing")).is_err());
    }
}
