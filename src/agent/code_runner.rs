use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::error::Result;
use super::executor::{ScriptExecutor, KIND_BASH, KIND_PYTHON};
use super::inference::LanguageModel;
use super::toolkit::{Tool, ToolResponse};

const SYSTEM_PROMPT: &str = "\
You are an automation agent that writes valid and secure Python or Bash scripts \
from user instructions. Follow these strict rules:

1. Security constraints:
   - Never access or exfiltrate data outside the '/data' directory.
   - Never delete any data anywhere on the file system.

2. Typical tasks include fetching data from an API and saving it, cloning a git \
repository and committing, running SQL queries against SQLite or DuckDB, scraping \
a website, compressing or resizing images, transcribing audio, converting Markdown \
to HTML, and filtering a CSV into JSON. Any other task should be solved in the same \
secure and reliable manner.

3. Return the response strictly as JSON with only these fields:
   - 'application_type': either 'bash' or 'python'.
   - 'task_code': the script body, without any surrounding formatting.
   - 'setup_code': optional bash commands to install required packages. The setup \
runs in a python:3.12-slim container; use apt-get, never sudo.

4. If an error is reported in the context, return an improved script that fixes it.

5. Python scripts must wrap their main logic in try/except, print the error to \
stderr, and exit non-zero on failure. Bash scripts must start with 'set -e'.

Your response must be valid JSON without additional text or formatting.";

#[derive(Debug, Deserialize)]
struct GeneratedScript {
    #[serde(default)]
    application_type: String,
    #[serde(default)]
    task_code: String,
    #[serde(default)]
    setup_code: String,
}

/// One failed repair attempt, rendered into the accumulated context so
/// later drafts see the full failure history.
#[derive(Debug)]
enum AttemptFailure {
    Parse {
        raw: String,
    },
    Setup {
        setup_code: String,
        error: String,
    },
    Execution {
        task_code: String,
        setup_code: String,
        error: String,
    },
}

impl AttemptFailure {
    fn render(&self) -> String {
        match self {
            AttemptFailure::Parse { raw } => format!(
                "\nError: could not parse the response as valid JSON:\n{}\n",
                raw
            ),
            AttemptFailure::Setup { setup_code, error } => format!(
                "\nSetup script failed:\n{}\nError:\n{}\nPlease fix the setup script accordingly.\n",
                setup_code, error
            ),
            AttemptFailure::Execution {
                task_code,
                setup_code,
                error,
            } => format!(
                "\nPrevious code:\n{}\nPrevious setup code:\n{}\nError:\n{}\nPlease fix the code accordingly.\n",
                task_code, setup_code, error
            ),
        }
    }
}

fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Fallback operation: generate a script for an arbitrary instruction,
/// execute it, and repair it from its own failures until it passes or the
/// iteration budget runs out.
pub struct CodeRunnerTool {
    model: Arc<dyn LanguageModel>,
    executor: Arc<dyn ScriptExecutor>,
    max_iterations: u32,
}

impl CodeRunnerTool {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        executor: Arc<dyn ScriptExecutor>,
        max_iterations: u32,
    ) -> Self {
        Self {
            model,
            executor,
            max_iterations,
        }
    }

    /// Parse and validate one draft. Any shortfall is a parse failure;
    /// nothing on this path reaches the executor.
    fn validate(raw: &str) -> std::result::Result<GeneratedScript, AttemptFailure> {
        let stripped = strip_code_fences(raw);
        let script: GeneratedScript = match serde_json::from_str(&stripped) {
            Ok(script) => script,
            Err(_) => {
                return Err(AttemptFailure::Parse { raw: stripped });
            }
        };

        let kind = script.application_type.trim();
        if kind != KIND_PYTHON && kind != KIND_BASH {
            return Err(AttemptFailure::Parse { raw: stripped });
        }
        if script.task_code.trim().is_empty() {
            return Err(AttemptFailure::Parse { raw: stripped });
        }
        Ok(script)
    }

    async fn run_loop(&self, instruction: &str) -> Result<ToolResponse> {
        let mut context = String::new();

        for iteration in 1..=self.max_iterations {
            let user_prompt = format!(
                "User instruction: {}\nContext: {}\n\nGenerate code to solve the user instruction.",
                instruction, context
            );

            let raw = self.model.generate(SYSTEM_PROMPT, &user_prompt).await?;

            let script = match Self::validate(&raw) {
                Ok(script) => script,
                Err(failure) => {
                    warn!("Draft {} was not a usable script", iteration);
                    context.push_str(&failure.render());
                    continue;
                }
            };

            if !script.setup_code.trim().is_empty() {
                let setup = self.executor.run(KIND_BASH, &script.setup_code).await?;
                if !setup.success {
                    warn!("Setup failed on iteration {}", iteration);
                    context.push_str(
                        &AttemptFailure::Setup {
                            setup_code: script.setup_code,
                            error: setup.output,
                        }
                        .render(),
                    );
                    continue;
                }
            }

            let kind = script.application_type.trim().to_string();
            let outcome = self.executor.run(&kind, &script.task_code).await?;

            if outcome.success {
                info!("Script succeeded on iteration {}", iteration);
                let mut data = serde_json::Map::new();
                data.insert("output".to_string(), Value::String(outcome.output));
                data.insert("iterations".to_string(), json!(iteration));
                return Ok(ToolResponse::success_with(data));
            }

            warn!("Script failed on iteration {}", iteration);
            context.push_str(
                &AttemptFailure::Execution {
                    task_code: script.task_code,
                    setup_code: script.setup_code,
                    error: outcome.output,
                }
                .render(),
            );
        }

        Ok(ToolResponse::error(format!(
            "Max iterations ({}) reached. Script execution failed.",
            self.max_iterations
        )))
    }
}

#[async_trait]
impl Tool for CodeRunnerTool {
    fn name(&self) -> &str {
        "code_runner"
    }

    fn description(&self) -> &str {
        "A fallback operation that handles tasks no specialized operation matches. \
         Generates and executes secure code to fulfill arbitrary automation requirements."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "user_instruction": {
                    "type": "string",
                    "description": "Natural language instruction describing the task exactly"
                }
            },
            "required": ["user_instruction"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolResponse> {
        let instruction = match args.get("user_instruction").and_then(|v| v.as_str()) {
            Some(text) if !text.trim().is_empty() => text,
            _ => return Ok(ToolResponse::error("user_instruction is required")),
        };
        self.run_loop(instruction).await
    }
}
