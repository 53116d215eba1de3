//! Dependency-manifest parsing: the `include_dependencies.xml`
//! produced inside each environment's build directory names every file a
//! unit depends on. `unit` and `file` are forced to list shape even when
//! an environment has exactly one of either, so a single-file unit
//! deserializes the same as a multi-file one.

use std::path::Path;

use quick_xml::de::from_str;
use serde::Deserialize;

use crate::error::{AtgError, Result};

#[derive(Debug, Deserialize)]
struct IncludeDeps {
    #[serde(rename = "unit", default)]
    unit: Vec<Unit>,
}

#[derive(Debug, Deserialize)]
struct Unit {
    #[serde(rename = "file", default)]
    file: Vec<String>,
}

/// One dependency file path as it literally appears in the manifest
/// (absolute, OS-native), before any repository-relative normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    pub path: String,
}

/// Parses the manifest's raw XML text into the flat list of referenced
/// file paths across every unit. Units with no `file` children contribute
/// nothing.
pub fn parse_manifest(xml: &str) -> Result<Vec<ManifestFile>> {
    let parsed: IncludeDeps = from_str(xml)
        .map_err(|e| AtgError::configuration(format!("invalid dependency manifest: {e}")))?;

    Ok(parsed
        .unit
        .into_iter()
        .flat_map(|u| u.file)
        .map(|path| ManifestFile { path })
        .collect())
}

/// Reads and parses the manifest at `path`.
pub fn parse_manifest_file(path: &Path) -> Result<Vec<ManifestFile>> {
    let xml = std::fs::read_to_string(path).map_err(|e| AtgError::io(path, e))?;
    parse_manifest(&xml)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_units_and_files() {
        let xml = r#"
<includedeps>
  <unit>
    <file>/repo/src/a.c</file>
    <file>/repo/src/b.c</file>
  </unit>
  <unit>
    <file>/repo/include/a.h</file>
  </unit>
</includedeps>
"#;
        let files = parse_manifest(xml).unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].path, "/repo/src/a.c");
    }

    #[test]
    fn unit_with_no_files_contributes_nothing() {
        let xml = r#"
<includedeps>
  <unit></unit>
  <unit><file>/repo/src/a.c</file></unit>
</includedeps>
"#;
        let files = parse_manifest(xml).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn single_unit_single_file_is_still_a_list() {
        let xml = r#"<includedeps><unit><file>/repo/src/a.c</file></unit></includedeps>"#;
        let files = parse_manifest(xml).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "/repo/src/a.c");
    }

    #[test]
    fn malformed_xml_is_a_configuration_error() {
        let err = parse_manifest("<not-xml").unwrap_err();
        assert!(matches!(err, AtgError::Configuration { .. }));
    }
}
