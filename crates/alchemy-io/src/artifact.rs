use std::path::{Path, PathBuf};

/// Per-network artifact path: `_{network_id}` goes before the final extension, or
/// at the end when the requested name has none.
///
/// `out/topo.json` + `F1` gives `out/topo_F1.json`; `out/topo` gives `out/topo_F1`.
pub fn artifact_path(requested: &Path, network_id: &str) -> PathBuf {
    let suffix: String = network_id
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let stem = requested
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match requested.extension() {
        Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    };
    requested.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_extension() {
        assert_eq!(
            artifact_path(Path::new("out/topo.json"), "F1"),
            PathBuf::from("out/topo_F1.json")
        );
    }

    #[test]
    fn test_without_extension() {
        assert_eq!(
            artifact_path(Path::new("topo"), "MV1"),
            PathBuf::from("topo_MV1")
        );
    }

    #[test]
    fn test_only_last_extension() {
        assert_eq!(
            artifact_path(Path::new("a.b.json"), "X"),
            PathBuf::from("a.b_X.json")
        );
    }

    #[test]
    fn test_separator_in_id() {
        assert_eq!(
            artifact_path(Path::new("t.json"), "A/B"),
            PathBuf::from("t_A_B.json")
        );
    }
}
