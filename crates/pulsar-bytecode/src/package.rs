//! The `.ppack` package archive.
//!
//! A package is a zip archive bundling compiled functions with a textual
//! manifest and optional resources:
//!
//! ```text
//! META-INF/MANIFEST.pulsar   Key: value metadata
//! classes/<name>.pbc         serialized functions
//! lib/<name>                 FFI library payloads
//! resources/<path>           arbitrary files
//! src/<path>                 human-readable source snippets
//! ```
//!
//! Packages are the eventual sink for lowered bytecode; nothing here
//! affects jump correctness.

use std::fmt;
use std::io::{Read, Seek, Write};
use std::str::FromStr;

use rustc_hash::FxHashMap;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::encode::{serialize_function, serialize_functions};
use crate::function::Function;

/// Version of the package format
pub const PACKAGE_FORMAT_VERSION: &str = "1.0";

const MANIFEST_PATH: &str = "META-INF/MANIFEST.pulsar";

/// Errors from building or opening a package.
#[derive(Debug, Error)]
pub enum PackageError {
    /// Reading or writing the archive failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The zip container is malformed or could not be written
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A function could not be encoded
    #[error(transparent)]
    Bytecode(#[from] crate::error::Error),

    /// The manifest is missing a required key or malformed
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// A requested archive entry does not exist
    #[error("missing entry: {0}")]
    MissingEntry(String),
}

/// Package metadata, serialized as `Key: value` lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// Package name
    pub name: String,
    /// Package version
    pub version: String,
    /// Class holding the entry function
    pub main_class: Option<String>,
    /// Entry function name within the main class
    pub entry_point: Option<String>,
    /// Free-form description
    pub description: Option<String>,
    /// Author
    pub author: Option<String>,
    /// Names of packages this one depends on
    pub dependencies: Vec<String>,
    /// FFI libraries bundled under `lib/`
    pub ffi_libraries: Vec<String>,
    /// Exported class names
    pub exports: Vec<String>,
    /// Package format version
    pub format_version: String,
}

impl Manifest {
    /// Manifest with the mandatory fields; everything else starts empty.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            main_class: None,
            entry_point: None,
            description: None,
            author: None,
            dependencies: Vec::new(),
            ffi_libraries: Vec::new(),
            exports: Vec::new(),
            format_version: PACKAGE_FORMAT_VERSION.to_string(),
        }
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PPack-Version: {}", self.format_version)?;
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Version: {}", self.version)?;
        if let Some(main_class) = &self.main_class {
            writeln!(f, "Main-Class: {main_class}")?;
        }
        if let Some(entry_point) = &self.entry_point {
            writeln!(f, "Entry-Point: {entry_point}")?;
        }
        if let Some(description) = &self.description {
            writeln!(f, "Description: {description}")?;
        }
        if let Some(author) = &self.author {
            writeln!(f, "Author: {author}")?;
        }
        if !self.dependencies.is_empty() {
            writeln!(f, "Dependencies: {}", self.dependencies.join(", "))?;
        }
        if !self.ffi_libraries.is_empty() {
            writeln!(f, "FFI-Libraries: {}", self.ffi_libraries.join(", "))?;
        }
        if !self.exports.is_empty() {
            writeln!(f, "Exports: {}", self.exports.join(", "))?;
        }
        Ok(())
    }
}

impl FromStr for Manifest {
    type Err = PackageError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let mut manifest = Manifest::new("", "");
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                return Err(PackageError::InvalidManifest(format!(
                    "line without a key: {line:?}"
                )));
            };
            let value = value.trim();
            match key.trim() {
                "PPack-Version" => manifest.format_version = value.to_string(),
                "Name" => manifest.name = value.to_string(),
                "Version" => manifest.version = value.to_string(),
                "Main-Class" => manifest.main_class = Some(value.to_string()),
                "Entry-Point" => manifest.entry_point = Some(value.to_string()),
                "Description" => manifest.description = Some(value.to_string()),
                "Author" => manifest.author = Some(value.to_string()),
                "Dependencies" => manifest.dependencies = split_list(value),
                "FFI-Libraries" => manifest.ffi_libraries = split_list(value),
                "Exports" => manifest.exports = split_list(value),
                // Unknown keys are carried by newer producers; skip them.
                _ => {}
            }
        }
        if manifest.name.is_empty() {
            return Err(PackageError::InvalidManifest("missing Name".into()));
        }
        Ok(manifest)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Assembles a package and writes it as a zip archive.
#[derive(Debug)]
pub struct PackageBuilder {
    manifest: Manifest,
    classes: FxHashMap<String, Vec<u8>>,
    libraries: FxHashMap<String, Vec<u8>>,
    resources: FxHashMap<String, Vec<u8>>,
    sources: FxHashMap<String, String>,
}

impl PackageBuilder {
    /// Starts a package with the mandatory manifest fields.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            manifest: Manifest::new(name, version),
            classes: FxHashMap::default(),
            libraries: FxHashMap::default(),
            resources: FxHashMap::default(),
            sources: FxHashMap::default(),
        }
    }

    /// Sets the class holding the entry function.
    pub fn main_class(mut self, main_class: impl Into<String>) -> Self {
        self.manifest.main_class = Some(main_class.into());
        self
    }

    /// Sets the entry function within the main class.
    pub fn entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.manifest.entry_point = Some(entry_point.into());
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.manifest.description = Some(description.into());
        self
    }

    /// Sets the author.
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.manifest.author = Some(author.into());
        self
    }

    /// Records a dependency on another package.
    pub fn dependency(mut self, dependency: impl Into<String>) -> Self {
        self.manifest.dependencies.push(dependency.into());
        self
    }

    /// Marks a class as exported.
    pub fn export(mut self, class: impl Into<String>) -> Self {
        self.manifest.exports.push(class.into());
        self
    }

    /// Adds a compiled function as a class.
    pub fn add_class(&mut self, name: &str, function: &Function) -> Result<(), PackageError> {
        self.classes
            .insert(name.to_string(), serialize_function(function)?);
        Ok(())
    }

    /// Adds several functions as one class (multi-function form).
    pub fn add_classes(&mut self, name: &str, functions: &[Function]) -> Result<(), PackageError> {
        self.classes
            .insert(name.to_string(), serialize_functions(functions)?);
        Ok(())
    }

    /// Bundles an FFI library payload under `lib/` and lists it in the
    /// manifest.
    pub fn add_library(&mut self, name: &str, payload: Vec<u8>) {
        self.libraries.insert(name.to_string(), payload);
        self.manifest.ffi_libraries.push(name.to_string());
    }

    /// Adds an arbitrary resource file.
    pub fn add_resource(&mut self, path: &str, payload: Vec<u8>) {
        self.resources.insert(path.to_string(), payload);
    }

    /// Adds a human-readable source snippet.
    pub fn add_source(&mut self, path: &str, source: impl Into<String>) {
        self.sources.insert(path.to_string(), source.into());
    }

    /// Writes the package archive.
    pub fn build<W: Write + Seek>(self, writer: W) -> Result<(), PackageError> {
        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        zip.start_file(MANIFEST_PATH, options)?;
        zip.write_all(self.manifest.to_string().as_bytes())?;

        for (name, bytecode) in &self.classes {
            zip.start_file(format!("classes/{name}.pbc"), options)?;
            zip.write_all(bytecode)?;
        }
        for (name, payload) in &self.libraries {
            zip.start_file(format!("lib/{name}"), options)?;
            zip.write_all(payload)?;
        }
        for (path, payload) in &self.resources {
            zip.start_file(format!("resources/{path}"), options)?;
            zip.write_all(payload)?;
        }
        for (path, source) in &self.sources {
            zip.start_file(format!("src/{path}"), options)?;
            zip.write_all(source.as_bytes())?;
        }

        zip.finish()?;
        Ok(())
    }
}

/// A package opened for reading.
#[derive(Debug)]
pub struct Package<R> {
    archive: ZipArchive<R>,
    manifest: Manifest,
}

impl<R: Read + Seek> Package<R> {
    /// Opens a package and parses its manifest.
    pub fn open(reader: R) -> Result<Self, PackageError> {
        let mut archive = ZipArchive::new(reader)?;
        let mut content = String::new();
        {
            let mut entry = archive
                .by_name(MANIFEST_PATH)
                .map_err(|_| PackageError::MissingEntry(MANIFEST_PATH.to_string()))?;
            entry.read_to_string(&mut content)?;
        }
        let manifest = content.parse()?;
        Ok(Self { archive, manifest })
    }

    /// The parsed manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// All entry paths in the archive, sorted.
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = self.archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    /// Class names found under `classes/`.
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .archive
            .file_names()
            .filter_map(|name| {
                name.strip_prefix("classes/")
                    .and_then(|rest| rest.strip_suffix(".pbc"))
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }

    /// Raw serialized bytes of one class.
    pub fn read_class(&mut self, name: &str) -> Result<Vec<u8>, PackageError> {
        let path = format!("classes/{name}.pbc");
        let mut entry = self
            .archive
            .by_name(&path)
            .map_err(|_| PackageError::MissingEntry(path.clone()))?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// A bundled source snippet.
    pub fn read_source(&mut self, path: &str) -> Result<String, PackageError> {
        let full = format!("src/{path}");
        let mut entry = self
            .archive
            .by_name(&full)
            .map_err(|_| PackageError::MissingEntry(full.clone()))?;
        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        Ok(content)
    }
}
