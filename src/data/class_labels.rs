//! Class name lookup for a loaded model.

use std::path::Path;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Metadata file written next to an exported model.
#[derive(Debug, Deserialize)]
struct ModelMetadata {
    #[serde(default)]
    classes: Vec<String>,
}

/// Parses the `names` metadata string stored in exported ONNX models.
///
/// String format: `{0: 'person', 1: 'bicycle', ..., 27: "yellow_lady's_slipper"}`
pub fn parse_metadata_names(names: &str) -> Vec<String> {
    let re = Regex::new(r#"(['"])([-()\w '"]+)(['"])"#).expect("static regex");
    let mut names_ = vec![];
    for (_, [_, name, _]) in re.captures_iter(names).map(|x| x.extract()) {
        names_.push(name.to_string());
    }
    names_
}

/// Reads `classes` from `<model stem>.json` next to the model, if that file exists.
pub fn read_sidecar_classes(model_path: &Path) -> Result<Option<Vec<String>>> {
    let sidecar = model_path.with_extension("json");
    if !sidecar.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&sidecar)
        .with_context(|| format!("reading {}", sidecar.display()))?;
    let metadata: ModelMetadata = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", sidecar.display()))?;
    if metadata.classes.is_empty() {
        return Ok(None);
    }
    Ok(Some(metadata.classes))
}

/// First non-empty source wins: model metadata, sidecar file, configuration, COCO.
pub fn resolve_class_names(
    from_metadata: Option<Vec<String>>,
    from_sidecar: Option<Vec<String>>,
    from_config: Option<Vec<String>>,
) -> Vec<String> {
    [from_metadata, from_sidecar, from_config]
        .into_iter()
        .flatten()
        .find(|names| !names.is_empty())
        .unwrap_or_else(|| COCO_CLASSES.iter().map(|x| x.to_string()).collect())
}

pub fn label_for(names: &[String], class_id: usize) -> String {
    names
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("# {}", class_id))
}
