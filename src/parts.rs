use std::{fs, path::Path};

use anyhow::Context as _;
use image::GenericImageView as _;

use crate::error::ForgeResult;

/// Canonical part names a fully-segmented character may carry. The template
/// fallback produces all of these except `weapon`, which only AI segmentation
/// can isolate.
pub const CANONICAL_PARTS: [&str; 7] =
    ["head", "body", "arm_L", "arm_R", "leg_L", "leg_R", "weapon"];

/// Grid regions used by the template fallback, as (left, top, right, bottom)
/// fractions of the source canvas. Order here is slot order downstream.
const TEMPLATE_REGIONS: [(&str, [f64; 4]); 6] = [
    ("head", [0.3, 0.0, 0.7, 0.25]),
    ("body", [0.2, 0.2, 0.8, 0.5]),
    ("arm_L", [0.0, 0.2, 0.3, 0.5]),
    ("arm_R", [0.7, 0.2, 1.0, 0.5]),
    ("leg_L", [0.2, 0.5, 0.5, 1.0]),
    ("leg_R", [0.5, 0.5, 0.8, 1.0]),
];

/// One extracted part: file reference plus its source bounding region in
/// pixels (left, top, right, bottom).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PartRecord {
    pub name: String,
    pub file: String,
    pub region: [f64; 4],
}

/// Output of the segmentation stage, stored as `parts/metadata.json`.
///
/// A document without a `parts` key deserializes as zero parts rather than
/// erroring; the rig stage then produces a skeleton with no slots.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PartsMetadata {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub parts: Vec<PartRecord>,
}

/// Template-grid fallback segmentation: crops the illustration into the six
/// fixed regions and writes one PNG per part into `parts_dir`.
///
/// Returns the metadata describing what was written; persisting it is the
/// caller's job.
pub fn split_template(image_path: &Path, parts_dir: &Path) -> ForgeResult<PartsMetadata> {
    let img = image::open(image_path)
        .with_context(|| format!("open illustration '{}'", image_path.display()))?;
    let (width, height) = img.dimensions();

    fs::create_dir_all(parts_dir)
        .with_context(|| format!("create parts dir '{}'", parts_dir.display()))?;

    let mut records = Vec::with_capacity(TEMPLATE_REGIONS.len());
    for (name, [l, t, r, b]) in TEMPLATE_REGIONS {
        let left = f64::from(width) * l;
        let top = f64::from(height) * t;
        let right = f64::from(width) * r;
        let bottom = f64::from(height) * b;

        let crop = img.crop_imm(
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        );
        let file = format!("{name}.png");
        crop.save(parts_dir.join(&file))
            .with_context(|| format!("write part '{file}'"))?;

        records.push(PartRecord {
            name: name.to_string(),
            file,
            region: [left, top, right, bottom],
        });
    }

    Ok(PartsMetadata {
        source: image_path.display().to_string(),
        method: "template".to_string(),
        parts: records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_png(path: &Path, width: u32, height: u32) {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        img.save(path).unwrap();
    }

    #[test]
    fn template_split_writes_six_parts_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("illustration.png");
        write_test_png(&src, 100, 200);

        let meta = split_template(&src, &dir.path().join("parts")).unwrap();
        let names: Vec<&str> = meta.parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["head", "body", "arm_L", "arm_R", "leg_L", "leg_R"]);
        assert_eq!(meta.method, "template");

        for part in &meta.parts {
            assert!(dir.path().join("parts").join(&part.file).exists());
        }
    }

    #[test]
    fn regions_scale_with_the_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("illustration.png");
        write_test_png(&src, 100, 200);

        let meta = split_template(&src, &dir.path().join("parts")).unwrap();
        let head = &meta.parts[0];
        assert_eq!(head.region, [30.0, 0.0, 70.0, 50.0]);
        let leg_r = meta.parts.iter().find(|p| p.name == "leg_R").unwrap();
        assert_eq!(leg_r.region, [50.0, 100.0, 80.0, 200.0]);
    }

    #[test]
    fn metadata_without_parts_key_is_zero_parts() {
        let meta: PartsMetadata = serde_json::from_str(r#"{"source": "x.png"}"#).unwrap();
        assert!(meta.parts.is_empty());
    }

    #[test]
    fn missing_source_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = split_template(&dir.path().join("nope.png"), &dir.path().join("parts"));
        assert!(err.is_err());
    }
}
