use parcel_core::{Error, Result};

use super::GeneratedCode;
use crate::fence::strip_fences;

/// Cleans a model reply into runnable code.
///
/// One surrounding code fence is removed. When `strip_marker` is set, the
/// first line containing it is dropped as well, and no other line.
///
/// # Errors
/// `Error::CodeGeneration` when nothing runnable is left.
pub fn sanitize_code(raw: &str, strip_marker: Option<&str>) -> Result<GeneratedCode> {
    let unfenced = strip_fences(raw);

    let source = match strip_marker.filter(|marker| !marker.is_empty()) {
        Some(marker) => {
            let mut removed = false;
            unfenced
                .lines()
                .filter(|line| {
                    if !removed && line.contains(marker) {
                        removed = true;
                        return false;
                    }
                    true
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        None => unfenced.to_owned(),
    };

    let source = source.trim();
    if source.is_empty() {
        return Err(Error::CodeGeneration(
            "model reply contained no code".to_owned(),
        ));
    }
    Ok(GeneratedCode::new(source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fence_and_keeps_every_line() {
        let raw = "```python\nimport pandas as pd\ndf = pd.read_json('data/properties.json')\nprint(df.shape)\n```";
        let code = sanitize_code(raw, None).unwrap();
        assert_eq!(
            code.source(),
            "import pandas as pd\ndf = pd.read_json('data/properties.json')\nprint(df.shape)"
        );
    }

    #[test]
    fn marker_removes_only_the_first_matching_line() {
        let raw = "```python\n# generated python\nimport json\nprint('python rocks')\n```";
        let code = sanitize_code(raw, Some("python")).unwrap();
        assert_eq!(code.source(), "import json\nprint('python rocks')");
    }

    #[test]
    fn empty_marker_is_ignored() {
        let code = sanitize_code("print(1)", Some("")).unwrap();
        assert_eq!(code.source(), "print(1)");
    }

    #[test]
    fn empty_reply_is_a_generation_error() {
        for raw in ["", "   ", "```python\n```", "```python\n# only python\n```"] {
            let error = sanitize_code(raw, Some("python")).unwrap_err();
            assert!(matches!(error, Error::CodeGeneration(_)), "{raw:?}");
        }
    }
}
