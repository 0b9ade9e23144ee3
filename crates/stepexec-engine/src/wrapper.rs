//! Wrapper synthesis: build the Python program that brackets the user's
//! script with variable setup and output-emission logic.
//!
//! The wrapper is composed of three phases sharing one top-level namespace:
//! a preamble (input variable + output sentinels), the user body spliced in
//! verbatim as code, and a postamble emitting one protocol marker line per
//! output variable. Because the body is code, not a nested string literal,
//! only the input path needs escaping.

use stepexec_core::step::Step;

use crate::protocol;

/// Escape a string for embedding inside a single-quoted Python literal.
/// Backslashes first, then the delimiter, so content can neither terminate
/// the literal early nor inject statements.
pub fn escape_py_str(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Synthesize the wrapper program for a step.
///
/// `user_body` is the resolved script text (inline, or read from the step's
/// local file by the caller). `input_path` is embedded as a literal when
/// input binding is enabled.
pub fn synthesize(step: &Step, input_path: Option<&str>, user_body: &str) -> String {
    let mut source = String::new();

    // Phase 1: preamble.
    if step.input.enabled {
        if let Some(path) = input_path {
            source.push_str(&format!(
                "{} = '{}'\n",
                step.input.variable_name(),
                escape_py_str(path)
            ));
        }
    }

    let output_vars = step.output.variable_names();
    if step.output.enabled {
        for var in &output_vars {
            source.push_str(&format!("{} = None\n", var));
        }
    }

    // Phase 2: the user's script, same namespace.
    source.push('\n');
    source.push_str(user_body);
    if !user_body.ends_with('\n') {
        source.push('\n');
    }

    // Phase 3: postamble. A variable the user never assigned falls back to
    // the input path (empty string when input binding is disabled).
    if step.output.enabled {
        let fallback = if step.input.enabled {
            escape_py_str(input_path.unwrap_or(""))
        } else {
            String::new()
        };
        source.push('\n');
        for var in &output_vars {
            source.push_str(&format!(
                "print('{marker}' + (str({var}) if {var} is not None else '{fallback}'))\n",
                marker = protocol::marker(var),
                var = var,
                fallback = fallback,
            ));
        }
    }

    source
}
