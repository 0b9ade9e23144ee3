//! Step data model: the shared "currency" between the pipeline builder and
//! the execution engine.
//!
//! These types are supplied whole on every invocation; the engine holds no
//! persistent Step state between calls. Wire names are camelCase because the
//! caller is a browser-app backend.

use serde::{Deserialize, Serialize};

/// Default input variable name when the step does not supply one.
pub const DEFAULT_INPUT_VARIABLE: &str = "INPUT_PATH";

/// Default output variable name when the step does not supply any.
pub const DEFAULT_OUTPUT_VARIABLE: &str = "OUTPUT_PATH";

/// Where the step's script body comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScriptSource {
    /// Reference to a file on disk (`scriptPath`).
    #[default]
    Local,
    /// Script text carried inline in the step (`inlineScript`).
    Inline,
}

/// Virtual-environment selection mode for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VenvMode {
    /// Discover a venv in conventional directories next to the script.
    #[default]
    Auto,
    /// Explicit venv root path (`venvPath`), degrading to ambient if invalid.
    Custom,
    /// Always use the ambient interpreter.
    None,
}

/// Input-variable binding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputBinding {
    /// Variable name injected into the wrapper; `None` means the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    /// Whether the input variable is injected at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for InputBinding {
    fn default() -> Self {
        Self {
            variable: None,
            enabled: true,
        }
    }
}

impl InputBinding {
    /// Effective variable name (configured or the conventional default).
    pub fn variable_name(&self) -> &str {
        self.variable.as_deref().unwrap_or(DEFAULT_INPUT_VARIABLE)
    }
}

/// Output-variable capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputBinding {
    /// Ordered output variable names; empty means the default single name.
    #[serde(default)]
    pub variables: Vec<String>,
    /// Whether output capture is performed at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for OutputBinding {
    fn default() -> Self {
        Self {
            variables: Vec::new(),
            enabled: true,
        }
    }
}

impl OutputBinding {
    /// Effective ordered variable names (configured or the single default).
    pub fn variable_names(&self) -> Vec<String> {
        if self.variables.is_empty() {
            vec![DEFAULT_OUTPUT_VARIABLE.to_string()]
        } else {
            self.variables.clone()
        }
    }
}

fn default_true() -> bool {
    true
}

/// One unit of scriptable work in a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Caller-assigned step identifier, echoed back in results.
    pub id: String,
    /// Display name, echoed back in results.
    #[serde(default)]
    pub name: String,
    /// Disabled steps succeed without spawning anything.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub script_source: ScriptSource,
    /// Path to the script file (required for `scriptSource: local`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_path: Option<String>,
    /// Inline script text (required for `scriptSource: inline`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_script: Option<String>,
    #[serde(default)]
    pub input: InputBinding,
    #[serde(default)]
    pub output: OutputBinding,
    #[serde(default)]
    pub venv_mode: VenvMode,
    /// Explicit venv root for `venvMode: custom`. May start with `~/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venv_path: Option<String>,
    /// Venv root resolved on a previous call, tried by `auto` mode after
    /// the conventional sibling directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_venv_path: Option<String>,
}

/// A Step plus the upstream artifact location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub step: Step,
    /// Required unless the step disables input binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_path: Option<String>,
}

/// Outcome record surfaced to orchestration logic.
///
/// `success == true` implies `output_paths` is non-empty whenever output
/// capture is enabled (falling back to the input path); `output_path` is the
/// first entry, kept for single-output consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub output_paths: Vec<String>,
    /// First of `output_paths`, or the input path as fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Captured stdout with protocol markers stripped.
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub step_id: String,
    pub step_name: String,
}

impl ExecutionResult {
    /// Success result. `output_paths` must already honor the capture
    /// fallback rules; the primary `output_path` is the first of the list,
    /// or `input_fallback` for single-output consumers when the list is
    /// empty.
    pub fn success(
        step: &Step,
        output_paths: Vec<String>,
        input_fallback: Option<&str>,
        stdout: String,
        stderr: String,
    ) -> Self {
        let output_path = output_paths
            .first()
            .cloned()
            .or_else(|| input_fallback.map(String::from));
        Self {
            success: true,
            output_paths,
            output_path,
            stdout,
            stderr,
            error: None,
            step_id: step.id.clone(),
            step_name: step.name.clone(),
        }
    }

    /// Failure result carrying whatever output was captured so far.
    pub fn failure(
        step: &Step,
        error: impl Into<String>,
        stdout: String,
        stderr: String,
    ) -> Self {
        Self {
            success: false,
            output_paths: Vec::new(),
            output_path: None,
            stdout,
            stderr,
            error: Some(error.into()),
            step_id: step.id.clone(),
            step_name: step.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_defaults_from_minimal_json() {
        let step: Step = serde_json::from_str(r#"{"id": "s1"}"#).unwrap();
        assert!(step.enabled);
        assert_eq!(step.script_source, ScriptSource::Local);
        assert_eq!(step.venv_mode, VenvMode::Auto);
        assert!(step.input.enabled);
        assert_eq!(step.input.variable_name(), "INPUT_PATH");
        assert!(step.output.enabled);
        assert_eq!(step.output.variable_names(), vec!["OUTPUT_PATH"]);
    }

    #[test]
    fn test_step_camel_case_wire_names() {
        let step: Step = serde_json::from_str(
            r#"{
                "id": "s1",
                "name": "clean",
                "scriptSource": "inline",
                "inlineScript": "pass",
                "venvMode": "custom",
                "venvPath": "~/envs/ml",
                "output": {"variables": ["A", "B"], "enabled": true}
            }"#,
        )
        .unwrap();
        assert_eq!(step.script_source, ScriptSource::Inline);
        assert_eq!(step.venv_mode, VenvMode::Custom);
        assert_eq!(step.venv_path.as_deref(), Some("~/envs/ml"));
        assert_eq!(step.output.variable_names(), vec!["A", "B"]);
    }

    #[test]
    fn test_result_primary_output_is_first_of_list() {
        let step: Step = serde_json::from_str(r#"{"id": "s1", "name": "n"}"#).unwrap();
        let res = ExecutionResult::success(
            &step,
            vec!["/a".into(), "/b".into()],
            None,
            String::new(),
            String::new(),
        );
        assert_eq!(res.output_path.as_deref(), Some("/a"));
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["outputPath"], "/a");
        assert_eq!(json["stepId"], "s1");
    }

    #[test]
    fn test_primary_output_falls_back_to_input() {
        let step: Step = serde_json::from_str(r#"{"id": "s1"}"#).unwrap();
        let res =
            ExecutionResult::success(&step, Vec::new(), Some("/in.csv"), String::new(), String::new());
        assert_eq!(res.output_path.as_deref(), Some("/in.csv"));
    }

    #[test]
    fn test_failure_result_has_no_outputs() {
        let step: Step = serde_json::from_str(r#"{"id": "s1"}"#).unwrap();
        let res = ExecutionResult::failure(&step, "boom", "out".into(), "err".into());
        assert!(!res.success);
        assert!(res.output_paths.is_empty());
        assert_eq!(res.error.as_deref(), Some("boom"));
        assert_eq!(res.stdout, "out");
    }
}
