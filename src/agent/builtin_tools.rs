use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde_json::{json, Map, Value};
use tokio::process::Command;
use tracing::info;
use url::Url;
use walkdir::WalkDir;

use super::code_runner::CodeRunnerTool;
use super::config::AgentConfig;
use super::error::Result;
use super::executor::ScriptExecutor;
use super::inference::LanguageModel;
use super::paths::PathGuard;
use super::toolkit::{OperationRegistry, Tool, ToolResponse};

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn str_arg_or(args: &Value, key: &str, default: &str) -> String {
    str_arg(args, key).unwrap_or(default).to_string()
}

/// The full operation set, in registration order. The fallback is always
/// registered last so specialized operations win the classifier's choice.
pub fn build_registry(
    config: Arc<AgentConfig>,
    model: Arc<dyn LanguageModel>,
    executor: Arc<dyn ScriptExecutor>,
    guard: PathGuard,
) -> OperationRegistry {
    OperationRegistry::new(vec![
        Arc::new(RunDatagenTool {
            config: config.clone(),
            guard: guard.clone(),
        }),
        Arc::new(FormatMarkdownTool {
            guard: guard.clone(),
        }),
        Arc::new(CountWeekdaysTool {
            guard: guard.clone(),
        }),
        Arc::new(SortContactsTool {
            guard: guard.clone(),
        }),
        Arc::new(RecentLogsTool {
            guard: guard.clone(),
        }),
        Arc::new(IndexMarkdownTool {
            guard: guard.clone(),
        }),
        Arc::new(ExtractEmailTool {
            guard: guard.clone(),
            default_email: config.default_email.clone(),
        }),
        Arc::new(ExtractCardTool {
            guard: guard.clone(),
            model: model.clone(),
        }),
        Arc::new(SimilarCommentsTool {
            guard: guard.clone(),
            model: model.clone(),
        }),
        Arc::new(TicketSalesTool { guard }),
        Arc::new(CodeRunnerTool::new(model, executor, config.max_iterations)),
    ])
}

/// Fetch a Python script from a URL and run it with an email argument.
pub struct RunDatagenTool {
    config: Arc<AgentConfig>,
    guard: PathGuard,
}

#[async_trait]
impl Tool for RunDatagenTool {
    fn name(&self) -> &str {
        "run_datagen"
    }

    fn description(&self) -> &str {
        "Run a Python script from a given URL, passing an email as the argument."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "email": {
                    "type": "string",
                    "description": "Email argument for the script"
                },
                "script_url": {
                    "type": "string",
                    "description": "URL of the Python script to execute"
                }
            },
            "required": ["script_url", "email"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolResponse> {
        let email = str_arg_or(args, "email", &self.config.default_email);
        let script_url = str_arg_or(args, "script_url", &self.config.datagen_url);

        if Url::parse(&script_url).is_err() {
            return Ok(ToolResponse::error(format!(
                "Invalid script URL: {}",
                script_url
            )));
        }

        let root = self.guard.root().to_string_lossy().to_string();
        info!("Running datagen script {} with root {}", script_url, root);

        let output = Command::new("uv")
            .args(["run", script_url.as_str(), email.as_str(), "--root", root.as_str()])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(ToolResponse::error(format!("Error: {}", stderr)));
        }

        let mut data = Map::new();
        data.insert(
            "output".to_string(),
            Value::String(String::from_utf8_lossy(&output.stdout).to_string()),
        );
        Ok(ToolResponse::success_with(data))
    }
}

/// Format a markdown file in place with a pinned prettier version.
pub struct FormatMarkdownTool {
    guard: PathGuard,
}

#[async_trait]
impl Tool for FormatMarkdownTool {
    fn name(&self) -> &str {
        "format_markdown"
    }

    fn description(&self) -> &str {
        "Format a markdown file using a specified version of Prettier."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prettier_version": {
                    "type": "string",
                    "description": "Version of prettier to use (x.y.z format)"
                },
                "filename": {
                    "type": "string",
                    "description": "Path to the markdown file to format"
                }
            },
            "required": ["filename"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolResponse> {
        let version = str_arg_or(args, "prettier_version", "3.4.2");
        let filename = str_arg_or(args, "filename", "/data/format.md");

        if !self.guard.exists(&filename) {
            return Ok(ToolResponse::error(format!(
                "File {} does not exist",
                filename
            )));
        }

        let target = self.guard.resolve(&filename);
        let package = format!("prettier@{}", version);
        info!("Formatting {} with {}", target.display(), package);

        let output = Command::new("npx")
            .args(["--yes", package.as_str(), "--write"])
            .arg(&target)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(ToolResponse::error(format!("Prettier failed: {}", stderr)));
        }

        let mut data = Map::new();
        data.insert(
            "output".to_string(),
            Value::String(String::from_utf8_lossy(&output.stdout).to_string()),
        );
        Ok(ToolResponse::success_with(data))
    }
}

fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d-%b-%Y", "%b %d, %Y", "%Y/%m/%d"];
    const DATETIME_FORMATS: [&str; 2] = ["%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

    let raw = raw.trim();
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Count occurrences of one weekday in a file of dates.
pub struct CountWeekdaysTool {
    guard: PathGuard,
}

#[async_trait]
impl Tool for CountWeekdaysTool {
    fn name(&self) -> &str {
        "count_weekdays"
    }

    fn description(&self) -> &str {
        "Count the number of occurrences of a specific weekday in a date file. \
         Weekday numbers are: 0=Monday, 1=Tuesday, 2=Wednesday, 3=Thursday, \
         4=Friday, 5=Saturday, 6=Sunday"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Input file containing one date per line"
                },
                "targetfile": {
                    "type": "string",
                    "description": "Output file to write the count to"
                },
                "weekday": {
                    "type": "integer",
                    "description": "Day of week (0=Monday .. 6=Sunday)"
                }
            },
            "required": ["weekday"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolResponse> {
        let filename = str_arg_or(args, "filename", "/data/dates.txt");
        let targetfile = str_arg_or(args, "targetfile", "/data/output.txt");

        let weekday = match args.get("weekday").and_then(|v| v.as_i64()) {
            Some(n) if (0..=6).contains(&n) => n as u32,
            Some(_) => {
                return Ok(ToolResponse::error("Weekday must be between 0 and 6"));
            }
            None => return Ok(ToolResponse::error("weekday is required")),
        };

        if !self.guard.exists(&filename) {
            return Ok(ToolResponse::error(format!(
                "Input file {} does not exist",
                filename
            )));
        }

        let contents = self.guard.read(&filename).await?;
        let mut count: u64 = 0;
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            match parse_flexible_date(line) {
                Some(date) => {
                    if date.weekday().num_days_from_monday() == weekday {
                        count += 1;
                    }
                }
                None => {
                    return Ok(ToolResponse::error(format!(
                        "Invalid date format: {}",
                        line.trim()
                    )));
                }
            }
        }

        self.guard.write(&targetfile, &count.to_string()).await?;

        let mut data = Map::new();
        data.insert("count".to_string(), json!(count));
        Ok(ToolResponse::success_with(data))
    }
}

/// Sort a JSON contacts array by last then first name.
pub struct SortContactsTool {
    guard: PathGuard,
}

#[async_trait]
impl Tool for SortContactsTool {
    fn name(&self) -> &str {
        "sort_contacts"
    }

    fn description(&self) -> &str {
        "Sort a JSON contacts file and save the sorted version to a target file."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Input JSON file containing contacts"
                },
                "targetfile": {
                    "type": "string",
                    "description": "Output JSON file to write sorted contacts to"
                }
            },
            "required": ["filename", "targetfile"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolResponse> {
        let filename = str_arg_or(args, "filename", "/data/contacts.json");
        let targetfile = str_arg_or(args, "targetfile", "/data/contacts-sorted.json");

        let contents = self.guard.read(&filename).await?;
        let mut contacts: Vec<Value> = serde_json::from_str(&contents)?;

        contacts.sort_by(|a, b| {
            let key = |c: &Value| {
                (
                    c.get("last_name")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                    c.get("first_name")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                )
            };
            key(a).cmp(&key(b))
        });

        self.guard
            .write(&targetfile, &serde_json::to_string_pretty(&contacts)?)
            .await?;
        Ok(ToolResponse::success())
    }
}

/// First line of each of the most recent log files, newest first.
pub struct RecentLogsTool {
    guard: PathGuard,
}

#[async_trait]
impl Tool for RecentLogsTool {
    fn name(&self) -> &str {
        "collect_recent_logs"
    }

    fn description(&self) -> &str {
        "Retrieve the most recent log files from a directory and save their first lines to an output file."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "log_dir_path": {
                    "type": "string",
                    "description": "Directory containing log files"
                },
                "output_file_path": {
                    "type": "string",
                    "description": "Output text file to write log lines to"
                },
                "num_files": {
                    "type": "integer",
                    "description": "Number of most recent files to process",
                    "minimum": 1
                }
            },
            "required": ["log_dir_path", "output_file_path", "num_files"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolResponse> {
        let log_dir = str_arg_or(args, "log_dir_path", "/data/logs");
        let output_file = str_arg_or(args, "output_file_path", "/data/logs-recent.txt");
        let num_files = args
            .get("num_files")
            .and_then(|v| v.as_u64())
            .filter(|n| *n > 0)
            .unwrap_or(10) as usize;

        let dir = self.guard.resolve(&log_dir);
        let mut logs: Vec<(std::time::SystemTime, std::path::PathBuf)> = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("log") {
                let modified = entry.metadata().await?.modified()?;
                logs.push((modified, path));
            }
        }

        logs.sort_by(|a, b| b.0.cmp(&a.0));
        logs.truncate(num_files);

        let mut lines = String::new();
        for (_, path) in &logs {
            let content = tokio::fs::read_to_string(path).await?;
            let first = content.lines().next().unwrap_or("").trim();
            lines.push_str(first);
            lines.push('\n');
        }

        self.guard.write(&output_file, &lines).await?;
        Ok(ToolResponse::success())
    }
}

/// Map each markdown document to its first H1 title.
pub struct IndexMarkdownTool {
    guard: PathGuard,
}

#[async_trait]
impl Tool for IndexMarkdownTool {
    fn name(&self) -> &str {
        "index_markdown_titles"
    }

    fn description(&self) -> &str {
        "Generate an index of markdown documents from a directory and save it as a JSON file."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "doc_dir_path": {
                    "type": "string",
                    "description": "Directory containing documents to index"
                },
                "output_file_path": {
                    "type": "string",
                    "description": "Output JSON file to write the index to"
                }
            },
            "required": ["doc_dir_path", "output_file_path"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolResponse> {
        let doc_dir = str_arg_or(args, "doc_dir_path", "/data/docs");
        let output_file = str_arg_or(args, "output_file_path", "/data/docs/index.json");

        let root = self.guard.resolve(&doc_dir);
        let mut files: Vec<std::path::PathBuf> = WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("md"))
            .collect();
        files.sort();

        let mut index = Map::new();
        for path in files {
            let content = tokio::fs::read_to_string(&path).await?;
            if let Some(title) = content
                .lines()
                .find(|line| line.starts_with("# "))
                .map(|line| line[2..].trim().to_string())
            {
                let rel = path
                    .strip_prefix(&root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                index.insert(rel, Value::String(title));
            }
        }

        self.guard
            .write(&output_file, &serde_json::to_string_pretty(&index)?)
            .await?;
        Ok(ToolResponse::success())
    }
}

/// Pull the sender address out of an email text file.
pub struct ExtractEmailTool {
    guard: PathGuard,
    default_email: String,
}

#[async_trait]
impl Tool for ExtractEmailTool {
    fn name(&self) -> &str {
        "extract_email_sender"
    }

    fn description(&self) -> &str {
        "Extract the sender's email address from a text file and save it to an output file."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Input text file containing email content"
                },
                "output_file": {
                    "type": "string",
                    "description": "Output text file to write the sender's address to"
                }
            },
            "required": ["filename", "output_file"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolResponse> {
        let filename = str_arg_or(args, "filename", "/data/email.txt");
        let output_file = str_arg_or(args, "output_file", "/data/email-sender.txt");

        let contents = self.guard.read(&filename).await?;
        let sender = contents
            .lines()
            .find(|line| line.starts_with("From"))
            .and_then(|line| line.split_whitespace().last())
            .map(|token| token.trim_matches(['<', '>']).to_string())
            .unwrap_or_else(|| self.default_email.clone());

        self.guard.write(&output_file, &sender).await?;

        let mut data = Map::new();
        data.insert("sender".to_string(), Value::String(sender));
        Ok(ToolResponse::success_with(data))
    }
}

/// Read a card number out of a PNG via the vision model.
pub struct ExtractCardTool {
    guard: PathGuard,
    model: Arc<dyn LanguageModel>,
}

#[async_trait]
impl Tool for ExtractCardTool {
    fn name(&self) -> &str {
        "extract_card_number"
    }

    fn description(&self) -> &str {
        "Extract the card number from a PNG image and save it to a text file."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "image_path": {
                    "type": "string",
                    "description": "Input PNG image containing the card details"
                },
                "filename": {
                    "type": "string",
                    "description": "Output text file to write the card number to"
                }
            },
            "required": ["filename", "image_path"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolResponse> {
        let image_path = str_arg_or(args, "image_path", "/data/credit-card.png");
        let filename = str_arg_or(args, "filename", "/data/credit-card.txt");

        let bytes = self.guard.read_bytes(&image_path).await?;
        let encoded = BASE64.encode(bytes);

        let text = self
            .model
            .describe_image(
                "Extract the 8+ digit number with spaces after every 4 digits",
                &encoded,
            )
            .await?;

        let number: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        self.guard.write(&filename, &number).await?;
        Ok(ToolResponse::success())
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// Find the most similar pair of comments by embedding distance.
pub struct SimilarCommentsTool {
    guard: PathGuard,
    model: Arc<dyn LanguageModel>,
}

#[async_trait]
impl Tool for SimilarCommentsTool {
    fn name(&self) -> &str {
        "find_similar_comments"
    }

    fn description(&self) -> &str {
        "Find the most similar pair of comments in a text file and save them to an output file."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Input text file containing one comment per line"
                },
                "output_filename": {
                    "type": "string",
                    "description": "Output text file to write the similar comments to"
                }
            },
            "required": ["filename", "output_filename"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolResponse> {
        let filename = str_arg_or(args, "filename", "/data/comments.txt");
        let output_filename = str_arg_or(args, "output_filename", "/data/comments-similar.txt");

        let contents = self.guard.read(&filename).await?;
        let comments: Vec<&str> = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        if comments.len() < 2 {
            return Ok(ToolResponse::error(
                "At least two comments are required to compare",
            ));
        }

        let mut embeddings = Vec::with_capacity(comments.len());
        for comment in &comments {
            embeddings.push(self.model.embed(comment).await?);
        }

        let mut best = (0, 1);
        let mut best_distance = f64::INFINITY;
        for i in 0..comments.len() {
            for j in (i + 1)..comments.len() {
                let distance = cosine_distance(&embeddings[i], &embeddings[j]);
                if distance < best_distance {
                    best_distance = distance;
                    best = (i, j);
                }
            }
        }

        let output = format!("{}\n{}\n", comments[best.0], comments[best.1]);
        self.guard.write(&output_filename, &output).await?;
        Ok(ToolResponse::success())
    }
}

/// Run an SQL aggregate against a SQLite database file.
pub struct TicketSalesTool {
    guard: PathGuard,
}

#[async_trait]
impl Tool for TicketSalesTool {
    fn name(&self) -> &str {
        "total_ticket_sales"
    }

    fn description(&self) -> &str {
        "Identify high-value (gold) ticket sales from a database and save the total to a text file."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Input SQLite database file containing ticket sales"
                },
                "output_filename": {
                    "type": "string",
                    "description": "Output text file to write the total to"
                },
                "query": {
                    "type": "string",
                    "description": "SQL query producing the total as a single value"
                }
            },
            "required": ["filename", "output_filename", "query"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolResponse> {
        let filename = str_arg_or(args, "filename", "/data/ticket-sales.db");
        let output_filename = str_arg_or(args, "output_filename", "/data/ticket-sales-gold.txt");
        let query = str_arg_or(
            args,
            "query",
            "SELECT SUM(units * price) FROM tickets WHERE type = 'Gold'",
        );

        let db_path = self.guard.resolve(&filename);
        let queried = tokio::task::spawn_blocking(move || -> anyhow::Result<f64> {
            let conn = rusqlite::Connection::open(db_path)?;
            let total: Option<f64> = conn.query_row(&query, [], |row| row.get(0))?;
            Ok(total.unwrap_or(0.0))
        })
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;

        let total = match queried {
            Ok(total) => total,
            Err(e) => {
                return Ok(ToolResponse::error(format!("Query failed: {}", e)));
            }
        };

        self.guard
            .write(&output_filename, &total.to_string())
            .await?;

        let mut data = Map::new();
        data.insert("total".to_string(), json!(total));
        Ok(ToolResponse::success_with(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::error::AgentError;
    use crate::agent::inference::{Classification, LanguageModel};
    use crate::agent::toolkit::{ToolSpec, ToolStatus};

    struct StubModel;

    #[async_trait]
    impl LanguageModel for StubModel {
        async fn classify(
            &self,
            _system_prompt: &str,
            _user_instruction: &str,
            _tools: &[ToolSpec],
        ) -> Result<Classification> {
            Err(AgentError::Model("not used".to_string()))
        }

        async fn generate(&self, _system_prompt: &str, _user: &str) -> Result<String> {
            Err(AgentError::Model("not used".to_string()))
        }

        async fn describe_image(&self, _prompt: &str, _png_base64: &str) -> Result<String> {
            Ok("1234 5678 9012".to_string())
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            // deterministic toy embedding: identical texts get identical vectors
            let mut v = vec![0.0f32; 8];
            for (i, byte) in text.bytes().enumerate() {
                v[i % 8] += byte as f32;
            }
            Ok(v)
        }
    }

    fn guard() -> (tempfile::TempDir, PathGuard) {
        let dir = tempfile::tempdir().unwrap();
        let guard = PathGuard::new(dir.path());
        (dir, guard)
    }

    #[tokio::test]
    async fn count_weekdays_counts_fridays() {
        let (_dir, guard) = guard();
        let dates = "\
2024-01-05\n2024-01-06\n2024-01-07\n2024-01-12\n2024-01-13\n\
15-Jan-2024\nJan 19, 2024\n2024/01/20\n2024-01-21\n2024-01-22\n";
        guard.write("dates.txt", dates).await.unwrap();

        let tool = CountWeekdaysTool {
            guard: guard.clone(),
        };
        let response = tool
            .execute(&serde_json::json!({
                "weekday": 4,
                "filename": "dates.txt",
                "targetfile": "output.txt"
            }))
            .await
            .unwrap();

        // Fridays above: 2024-01-05, 2024-01-12, Jan 19 2024
        assert_eq!(response.status, ToolStatus::Success);
        assert_eq!(response.data["count"], json!(3));
        assert_eq!(guard.read("output.txt").await.unwrap(), "3");
    }

    #[tokio::test]
    async fn count_weekdays_rejects_out_of_range_weekday() {
        let (_dir, guard) = guard();
        guard.write("dates.txt", "2024-01-05\n").await.unwrap();
        let tool = CountWeekdaysTool {
            guard: guard.clone(),
        };
        let response = tool
            .execute(&serde_json::json!({"weekday": 9, "filename": "dates.txt"}))
            .await
            .unwrap();
        assert_eq!(response.status, ToolStatus::Error);
        assert!(response.message.contains("between 0 and 6"));
    }

    #[tokio::test]
    async fn count_weekdays_reports_unparseable_dates() {
        let (_dir, guard) = guard();
        guard.write("dates.txt", "not a date\n").await.unwrap();
        let tool = CountWeekdaysTool {
            guard: guard.clone(),
        };
        let response = tool
            .execute(&serde_json::json!({"weekday": 0, "filename": "dates.txt"}))
            .await
            .unwrap();
        assert_eq!(response.status, ToolStatus::Error);
        assert!(response.message.contains("Invalid date format"));
    }

    #[tokio::test]
    async fn sort_contacts_orders_by_last_then_first() {
        let (_dir, guard) = guard();
        let contacts = serde_json::json!([
            {"first_name": "Ada", "last_name": "Wong"},
            {"first_name": "Zoe", "last_name": "Adams"},
            {"first_name": "Ann", "last_name": "Adams"}
        ]);
        guard
            .write("contacts.json", &contacts.to_string())
            .await
            .unwrap();

        let tool = SortContactsTool {
            guard: guard.clone(),
        };
        let response = tool
            .execute(&serde_json::json!({
                "filename": "contacts.json",
                "targetfile": "contacts-sorted.json"
            }))
            .await
            .unwrap();
        assert_eq!(response.status, ToolStatus::Success);

        let sorted: Vec<Value> =
            serde_json::from_str(&guard.read("contacts-sorted.json").await.unwrap()).unwrap();
        let names: Vec<(&str, &str)> = sorted
            .iter()
            .map(|c| {
                (
                    c["last_name"].as_str().unwrap(),
                    c["first_name"].as_str().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            names,
            vec![("Adams", "Ann"), ("Adams", "Zoe"), ("Wong", "Ada")]
        );
    }

    #[tokio::test]
    async fn extract_email_takes_sender_from_from_line() {
        let (_dir, guard) = guard();
        let email = "Subject: hi\nFrom: Jane Doe <jane@example.com>\nTo: bob@example.com\n";
        guard.write("email.txt", email).await.unwrap();

        let tool = ExtractEmailTool {
            guard: guard.clone(),
            default_email: "fallback@example.com".to_string(),
        };
        let response = tool
            .execute(&serde_json::json!({
                "filename": "email.txt",
                "output_file": "email-sender.txt"
            }))
            .await
            .unwrap();
        assert_eq!(response.status, ToolStatus::Success);
        assert_eq!(
            guard.read("email-sender.txt").await.unwrap(),
            "jane@example.com"
        );
    }

    #[tokio::test]
    async fn extract_email_falls_back_when_no_sender_line() {
        let (_dir, guard) = guard();
        guard.write("email.txt", "Subject: hi\n").await.unwrap();

        let tool = ExtractEmailTool {
            guard: guard.clone(),
            default_email: "fallback@example.com".to_string(),
        };
        tool.execute(&serde_json::json!({
            "filename": "email.txt",
            "output_file": "email-sender.txt"
        }))
        .await
        .unwrap();
        assert_eq!(
            guard.read("email-sender.txt").await.unwrap(),
            "fallback@example.com"
        );
    }

    #[tokio::test]
    async fn index_markdown_maps_relative_paths_to_titles() {
        let (_dir, guard) = guard();
        guard.write("docs/a.md", "# Alpha\nbody\n").await.unwrap();
        guard
            .write("docs/sub/b.md", "intro\n# Beta\n")
            .await
            .unwrap();
        guard
            .write("docs/no-title.md", "plain text\n")
            .await
            .unwrap();

        let tool = IndexMarkdownTool {
            guard: guard.clone(),
        };
        let response = tool
            .execute(&serde_json::json!({
                "doc_dir_path": "docs",
                "output_file_path": "docs/index.json"
            }))
            .await
            .unwrap();
        assert_eq!(response.status, ToolStatus::Success);

        let index: Map<String, Value> =
            serde_json::from_str(&guard.read("docs/index.json").await.unwrap()).unwrap();
        assert_eq!(index["a.md"], json!("Alpha"));
        assert_eq!(index["sub/b.md"], json!("Beta"));
        assert!(!index.contains_key("no-title.md"));
    }

    #[tokio::test]
    async fn recent_logs_writes_first_lines_newest_first() {
        let (_dir, guard) = guard();
        guard
            .write("logs/old.log", "old first\nrest\n")
            .await
            .unwrap();
        // force distinct mtimes
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        guard
            .write("logs/new.log", "new first\nrest\n")
            .await
            .unwrap();

        let tool = RecentLogsTool {
            guard: guard.clone(),
        };
        let response = tool
            .execute(&serde_json::json!({
                "log_dir_path": "logs",
                "output_file_path": "logs-recent.txt",
                "num_files": 1
            }))
            .await
            .unwrap();
        assert_eq!(response.status, ToolStatus::Success);
        assert_eq!(guard.read("logs-recent.txt").await.unwrap(), "new first\n");
    }

    #[tokio::test]
    async fn similar_comments_picks_the_closest_pair() {
        let (_dir, guard) = guard();
        guard
            .write(
                "comments.txt",
                "the cake was great\ncompletely unrelated remark\nthe cake was great\n",
            )
            .await
            .unwrap();

        let tool = SimilarCommentsTool {
            guard: guard.clone(),
            model: Arc::new(StubModel),
        };
        let response = tool
            .execute(&serde_json::json!({
                "filename": "comments.txt",
                "output_filename": "similar.txt"
            }))
            .await
            .unwrap();
        assert_eq!(response.status, ToolStatus::Success);
        assert_eq!(
            guard.read("similar.txt").await.unwrap(),
            "the cake was great\nthe cake was great\n"
        );
    }

    #[tokio::test]
    async fn similar_comments_needs_at_least_two_lines() {
        let (_dir, guard) = guard();
        guard.write("comments.txt", "only one\n").await.unwrap();

        let tool = SimilarCommentsTool {
            guard: guard.clone(),
            model: Arc::new(StubModel),
        };
        let response = tool
            .execute(&serde_json::json!({
                "filename": "comments.txt",
                "output_filename": "similar.txt"
            }))
            .await
            .unwrap();
        assert_eq!(response.status, ToolStatus::Error);
    }

    #[tokio::test]
    async fn extract_card_strips_whitespace_from_model_answer() {
        let (_dir, guard) = guard();
        guard.write("card.png", "not really a png").await.unwrap();

        let tool = ExtractCardTool {
            guard: guard.clone(),
            model: Arc::new(StubModel),
        };
        let response = tool
            .execute(&serde_json::json!({
                "image_path": "card.png",
                "filename": "card.txt"
            }))
            .await
            .unwrap();
        assert_eq!(response.status, ToolStatus::Success);
        assert_eq!(guard.read("card.txt").await.unwrap(), "123456789012");
    }

    #[tokio::test]
    async fn dispatch_scenario_counts_fridays() {
        use crate::agent::dispatcher::Dispatcher;
        use crate::agent::inference::SelectedAction;

        struct FridayClassifier;

        #[async_trait]
        impl LanguageModel for FridayClassifier {
            async fn classify(
                &self,
                _system_prompt: &str,
                _user_instruction: &str,
                _tools: &[ToolSpec],
            ) -> Result<Classification> {
                Ok(Classification {
                    action: Some(SelectedAction {
                        name: "count_weekdays".to_string(),
                        arguments: serde_json::json!({
                            "weekday": 4,
                            "filename": "dates.txt",
                            "targetfile": "output.txt"
                        })
                        .to_string(),
                    }),
                    raw_text: String::new(),
                })
            }

            async fn generate(&self, _system_prompt: &str, _user: &str) -> Result<String> {
                Err(AgentError::Model("not used".to_string()))
            }

            async fn describe_image(&self, _prompt: &str, _png_base64: &str) -> Result<String> {
                Err(AgentError::Model("not used".to_string()))
            }

            async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                Err(AgentError::Model("not used".to_string()))
            }
        }

        let (_dir, guard) = guard();
        let dates = "\
2024-01-05\n2024-01-06\n2024-01-07\n2024-01-12\n2024-01-13\n\
15-Jan-2024\nJan 19, 2024\n2024/01/20\n2024-01-21\n2024-01-22\n";
        guard.write("dates.txt", dates).await.unwrap();

        let registry = Arc::new(crate::agent::toolkit::OperationRegistry::new(vec![
            Arc::new(CountWeekdaysTool {
                guard: guard.clone(),
            }),
        ]));
        let dispatcher = Dispatcher::new(Arc::new(FridayClassifier), registry);

        let response = dispatcher
            .dispatch("count Fridays in dates.txt")
            .await
            .unwrap();
        assert_eq!(response.status, ToolStatus::Success);
        assert_eq!(response.data["count"], json!(3));
        assert_eq!(guard.read("output.txt").await.unwrap(), "3");
    }

    #[tokio::test]
    async fn ticket_sales_sums_gold_rows() {
        let (_dir, guard) = guard();
        let db_path = guard.resolve("ticket-sales.db");
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(db_path).unwrap();
            conn.execute_batch(
                "CREATE TABLE tickets (type TEXT, units INTEGER, price REAL);
                 INSERT INTO tickets VALUES ('Gold', 2, 10.0);
                 INSERT INTO tickets VALUES ('Silver', 5, 1.0);
                 INSERT INTO tickets VALUES ('Gold', 1, 5.5);",
            )
            .unwrap();
        })
        .await
        .unwrap();

        let tool = TicketSalesTool {
            guard: guard.clone(),
        };
        let response = tool
            .execute(&serde_json::json!({
                "filename": "ticket-sales.db",
                "output_filename": "gold.txt"
            }))
            .await
            .unwrap();
        assert_eq!(response.status, ToolStatus::Success);
        assert_eq!(guard.read("gold.txt").await.unwrap(), "25.5");
        assert_eq!(response.data["total"], json!(25.5));
    }
}
