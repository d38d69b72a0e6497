use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use anyhow::Context as _;

use crate::error::{ForgeError, ForgeResult};

/// One character to generate, as loaded from the batch input file.
///
/// Unknown columns/keys are kept in `extra` and written back verbatim to the
/// character's `config.json`, so downstream tooling can attach its own fields.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CharacterSpec {
    /// Unique key; doubles as the character's directory name.
    #[serde(default = "default_character_id")]
    pub character_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub emotion: String,
    #[serde(default = "default_animation_preset")]
    pub animation_preset: String,
    #[serde(default = "default_rig_preset")]
    pub rig_preset: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_character_id() -> String {
    "unknown".to_string()
}

fn default_animation_preset() -> String {
    "combat".to_string()
}

fn default_rig_preset() -> String {
    "humanoid".to_string()
}

/// Loads the batch roster from a CSV or JSON file, selected by extension.
///
/// CSV column headers are field names; JSON accepts either a top-level array
/// of specs or an object with a `characters` array. Any failure here is fatal
/// to the whole run (the only hard-abort error in the pipeline).
pub fn load_roster(path: &Path) -> ForgeResult<Vec<CharacterSpec>> {
    if !path.exists() {
        return Err(ForgeError::batch_input(format!(
            "batch file not found: '{}'",
            path.display()
        )));
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => load_csv(path),
        _ => load_json(path),
    }
}

fn load_csv(path: &Path) -> ForgeResult<Vec<CharacterSpec>> {
    let file = File::open(path)
        .with_context(|| format!("open batch csv '{}'", path.display()))
        .map_err(|e| ForgeError::batch_input(e.to_string()))?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let headers = reader
        .headers()
        .map_err(|e| ForgeError::batch_input(format!("read csv headers: {e}")))?
        .clone();

    let mut specs = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ForgeError::batch_input(format!("read csv row: {e}")))?;
        // Cells come through as strings; the spec's typed fields pick out what
        // they need and the rest stays in `extra`.
        let mut row = serde_json::Map::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            row.insert(
                header.to_string(),
                serde_json::Value::String(cell.to_string()),
            );
        }
        let spec: CharacterSpec = serde_json::from_value(serde_json::Value::Object(row))
            .map_err(|e| ForgeError::batch_input(format!("parse csv row: {e}")))?;
        specs.push(spec);
    }
    Ok(specs)
}

fn load_json(path: &Path) -> ForgeResult<Vec<CharacterSpec>> {
    let file = File::open(path)
        .with_context(|| format!("open batch json '{}'", path.display()))
        .map_err(|e| ForgeError::batch_input(e.to_string()))?;
    let value: serde_json::Value = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| ForgeError::batch_input(format!("parse batch json: {e}")))?;

    let rows = match value {
        serde_json::Value::Array(rows) => rows,
        serde_json::Value::Object(mut map) => match map.remove("characters") {
            Some(serde_json::Value::Array(rows)) => rows,
            Some(_) => {
                return Err(ForgeError::batch_input(
                    "'characters' must be an array of character specs",
                ));
            }
            None => Vec::new(),
        },
        _ => {
            return Err(ForgeError::batch_input(
                "batch json must be an array or an object with a 'characters' array",
            ));
        }
    };

    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| ForgeError::batch_input(format!("parse character spec: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_array_roundtrip_keeps_extra_fields() {
        let spec: CharacterSpec = serde_json::from_str(
            r#"{"character_id":"char_001","description":"a knight","faction":"north"}"#,
        )
        .unwrap();
        assert_eq!(spec.character_id, "char_001");
        assert_eq!(spec.animation_preset, "combat");
        assert_eq!(spec.rig_preset, "humanoid");
        assert_eq!(
            spec.extra.get("faction"),
            Some(&serde_json::Value::String("north".to_string()))
        );

        let back = serde_json::to_value(&spec).unwrap();
        assert_eq!(back["faction"], "north");
    }

    #[test]
    fn missing_character_id_falls_back_to_unknown() {
        let spec: CharacterSpec = serde_json::from_str(r#"{"description":"x"}"#).unwrap();
        assert_eq!(spec.character_id, "unknown");
    }

    #[test]
    fn csv_headers_map_to_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chars.csv");
        std::fs::write(
            &path,
            "character_id,description,style,animation_preset,mood\n\
             char_a,a wizard,pixel,npc,calm\n\
             char_b,a slime,,combat,\n",
        )
        .unwrap();

        let specs = load_roster(&path).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].character_id, "char_a");
        assert_eq!(specs[0].animation_preset, "npc");
        assert_eq!(
            specs[0].extra.get("mood"),
            Some(&serde_json::Value::String("calm".to_string()))
        );
        // Empty cells stay empty rather than picking up defaults; preset
        // resolution handles unknown names downstream.
        assert_eq!(specs[1].style, "");
    }

    #[test]
    fn json_object_without_characters_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chars.json");
        std::fs::write(&path, r#"{"version": 1}"#).unwrap();
        assert!(load_roster(&path).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_a_batch_input_error() {
        let err = load_roster(Path::new("/nonexistent/chars.json")).unwrap_err();
        assert!(matches!(err, ForgeError::BatchInput(_)));
    }

    #[test]
    fn scalar_json_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chars.json");
        std::fs::write(&path, "42").unwrap();
        assert!(load_roster(&path).is_err());
    }
}
