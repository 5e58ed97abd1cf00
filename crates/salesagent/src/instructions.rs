use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

/// Render an instruction template with the runtime substitutions (the
/// database schema description and, when the code interpreter carries a font
/// bundle, the uploaded font file id). The rendered text is what the agent
/// definition is created with; no placeholder tokens survive rendering.
pub fn render_instructions<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("instructions", template)?;
    let context = Context::from_serialize(context_data)?;
    tera.render("instructions", &context)
}

pub fn render_instructions_file<T: Serialize>(
    template_file: impl Into<PathBuf>,
    context_data: &T,
) -> Result<String, TeraError> {
    let file_path = template_file.into();
    let template = fs::read_to_string(file_path)
        .map_err(|e| TeraError::chain("Failed to read instructions file", e))?;
    render_instructions(&template, context_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn schema_description_round_trips_verbatim() {
        let schema = "Table sales Schema: Columns: region: (TEXT), amount: (REAL)";
        let template =
            "Use this schema:\n{{ database_schema_string }}\nAnswer sales questions only.";
        let mut context = HashMap::new();
        context.insert("database_schema_string".to_string(), schema.to_string());

        let rendered = render_instructions(template, &context).unwrap();
        assert!(rendered.contains(schema));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn missing_variable_is_an_error() {
        let template = "Font file: {{ font_file_id }}";
        let context: HashMap<String, String> = HashMap::new();
        assert!(render_instructions(template, &context).is_err());
    }

    #[test]
    fn renders_from_a_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("function_calling.txt");
        fs::write(&file_path, "Schema: {{ database_schema_string }}").unwrap();

        let mut context = HashMap::new();
        context.insert("database_schema_string".to_string(), "tables".to_string());

        let rendered = render_instructions_file(file_path, &context).unwrap();
        assert_eq!(rendered, "Schema: tables");
    }

    #[test]
    fn missing_file_is_an_error() {
        let context: HashMap<String, String> = HashMap::new();
        assert!(render_instructions_file("no_such_template.txt", &context).is_err());
    }
}
