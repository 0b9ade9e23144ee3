use clap::{Parser, Subcommand};

/// stepexec - pipeline step execution engine
#[derive(Parser, Debug)]
#[command(name = "stepexec")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a pipeline step and print the ExecutionResult as JSON
    Run {
        /// Path to the ExecutionRequest JSON file. Use "-" to read from stdin
        #[arg(value_name = "REQUEST_JSON")]
        request: String,

        /// Input path override (upstream artifact location)
        #[arg(long, value_name = "PATH")]
        input: Option<String>,

        /// Execution timeout in seconds (default: from env or 300)
        #[arg(long)]
        timeout: Option<u64>,

        /// Maximum combined output size in MiB (default: from env or 10)
        #[arg(long)]
        max_output_mb: Option<u64>,
    },

    /// Invoke the dataset-versioning helper and print the decoded result
    Helper {
        /// Path to the HelperRequest JSON file. Use "-" to read from stdin
        #[arg(value_name = "REQUEST_JSON")]
        request: String,

        /// Path to the helper CLI script
        #[arg(long, value_name = "FILE")]
        script: String,

        /// Project directory (venv/uv discovery + working directory)
        #[arg(long, value_name = "DIR", default_value = ".")]
        project: String,

        /// SDK module imported by the availability probe
        #[arg(long, value_name = "MODULE")]
        sdk_module: Option<String>,

        /// Execution timeout in seconds (default: from env or 300)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Resolve and print the interpreter a step would run with
    Resolve {
        /// Path to the Step JSON file. Use "-" to read from stdin
        #[arg(value_name = "STEP_JSON")]
        step: String,
    },
}
