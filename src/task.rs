//! Task definitions and the contracts they declare.
//!
//! A [`TaskDefinition`] is a stateless template registered ahead of time:
//! what kind of collaborator executes it, how the dispatch request is framed,
//! which input fields must be present, and what shape the output must have.
//! Definitions are pure data; execution and durability live in
//! [`crate::runtime::executor`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::json_ext::json_type_name;

/// The execution capability a task requires.
///
/// Domain processes dispatch many "roles" (reviewers, analysts, certifiers),
/// but all of them are polymorphism over a single capability. The tag exists
/// so further capabilities can be added without reshaping the definition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Dispatched to an AI-agent execution collaborator.
    #[default]
    Agent,
}

/// Expected JSON type of a declared output field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    /// Any non-null value.
    Any,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => !value.is_null(),
        }
    }

    fn expected(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Any => "non-null value",
        }
    }
}

/// One required field in a task's declared output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

/// Declared shape of a task's output.
///
/// Validation checks that the output is a JSON object carrying every
/// required field with the declared type. An empty schema accepts any
/// output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSchema {
    #[serde(default)]
    pub required: Vec<FieldSpec>,
}

impl OutputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a field of the given type.
    #[must_use]
    pub fn require(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.required.push(FieldSpec {
            name: name.into(),
            kind,
        });
        self
    }

    /// Validate `output` against the schema, returning every violation.
    pub fn validate(&self, output: &Value) -> Result<(), Vec<String>> {
        if self.required.is_empty() {
            return Ok(());
        }
        let Some(object) = output.as_object() else {
            return Err(vec![format!(
                "expected a JSON object, got {}",
                json_type_name(output)
            )]);
        };

        let mut violations = Vec::new();
        for field in &self.required {
            match object.get(&field.name) {
                None => violations.push(format!("missing required field '{}'", field.name)),
                Some(value) if !field.kind.matches(value) => violations.push(format!(
                    "field '{}' expected {}, got {}",
                    field.name,
                    field.kind.expected(),
                    json_type_name(value)
                )),
                Some(_) => {}
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Stateless template for one kind of task.
///
/// The `name` doubles as the default call-site token for effect identity, so
/// it must be stable for the lifetime of in-flight runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub kind: TaskKind,
    /// Role the execution collaborator should assume.
    pub role: String,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// Top-level input fields that must be present before dispatch.
    #[serde(default)]
    pub input_contract: Vec<String>,
    #[serde(default)]
    pub output_schema: OutputSchema,
}

fn default_output_format() -> String {
    "json".to_string()
}

impl TaskDefinition {
    /// An agent-kind task with the given identity and role.
    pub fn agent(
        name: impl Into<String>,
        title: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            kind: TaskKind::Agent,
            role: role.into(),
            instructions: Vec::new(),
            output_format: default_output_format(),
            input_contract: Vec::new(),
            output_schema: OutputSchema::default(),
        }
    }

    #[must_use]
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    #[must_use]
    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }

    #[must_use]
    pub fn with_required_input(mut self, field: impl Into<String>) -> Self {
        self.input_contract.push(field.into());
        self
    }

    #[must_use]
    pub fn with_output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = schema;
        self
    }

    /// Names of required input fields absent from `input`.
    pub fn missing_inputs(&self, input: &Value) -> Vec<String> {
        let object = input.as_object();
        self.input_contract
            .iter()
            .filter(|field| {
                object
                    .and_then(|o| o.get(field.as_str()))
                    .is_none_or(Value::is_null)
            })
            .cloned()
            .collect()
    }

    /// Frame the wire request for the execution collaborator.
    pub fn request(&self, input: &Value) -> TaskRequest {
        TaskRequest {
            role: self.role.clone(),
            task: self.title.clone(),
            context: input.clone(),
            instructions: self.instructions.clone(),
            output_format: self.output_format.clone(),
        }
    }
}

/// Wire request handed to the execution collaborator.
///
/// Serializes with camelCase keys per the external task contract:
/// `{role, task, context, instructions[], outputFormat}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub role: String,
    pub task: String,
    pub context: Value,
    pub instructions: Vec<String>,
    pub output_format: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> TaskDefinition {
        TaskDefinition::agent("assess-risk", "Assess residual risk", "risk-analyst")
            .with_instruction("List each residual risk with a severity.")
            .with_required_input("design")
            .with_output_schema(
                OutputSchema::new()
                    .require("risks", FieldKind::Array)
                    .require("summary", FieldKind::String),
            )
    }

    #[test]
    fn missing_inputs_reports_absent_and_null_fields() {
        let def = sample();
        assert_eq!(def.missing_inputs(&json!({})), vec!["design"]);
        assert_eq!(def.missing_inputs(&json!({"design": null})), vec!["design"]);
        assert!(def.missing_inputs(&json!({"design": "doc"})).is_empty());
    }

    #[test]
    fn output_schema_validates_types() {
        let def = sample();
        assert!(
            def.output_schema
                .validate(&json!({"risks": [], "summary": "ok"}))
                .is_ok()
        );

        let violations = def
            .output_schema
            .validate(&json!({"risks": "oops", "summary": 3}))
            .unwrap_err();
        assert_eq!(violations.len(), 2);

        let violations = def.output_schema.validate(&json!("not an object")).unwrap_err();
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn request_serializes_camel_case() {
        let def = sample();
        let wire = serde_json::to_value(def.request(&json!({"design": "doc"}))).unwrap();
        assert_eq!(wire["outputFormat"], "json");
        assert_eq!(wire["role"], "risk-analyst");
        assert_eq!(wire["context"]["design"], "doc");
    }
}
