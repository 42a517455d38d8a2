//! Result sinks: where outcomes go after a run.
//!
//! Every sink takes ownership of an [`ExecutionOutcome`]. The file sinks and the console sink all
//! work on the same flat "enriched" record built by [`enrich`]: the test's detail fields plus
//! run metadata.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::engine::{ExecutionOutcome, OutcomeStatus};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write result to {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write result")]
    Console(#[source] io::Error),

    #[error("failed to serialize result")]
    Serialize(#[from] serde_json::Error),
}

/// Consumer of execution outcomes.
pub trait ResultSink {
    fn accept(&mut self, outcome: ExecutionOutcome) -> Result<(), SinkError>;
}

/// Collects outcomes in memory.
impl ResultSink for Vec<ExecutionOutcome> {
    fn accept(&mut self, outcome: ExecutionOutcome) -> Result<(), SinkError> {
        self.push(outcome);
        Ok(())
    }
}

impl<S: ResultSink + ?Sized> ResultSink for &mut S {
    fn accept(&mut self, outcome: ExecutionOutcome) -> Result<(), SinkError> {
        (**self).accept(outcome)
    }
}

/// Flatten an outcome into one record.
///
/// Object payloads contribute their fields directly; any other non-null payload lands under
/// `detail`. Metadata keys win over payload keys of the same name.
pub fn enrich(outcome: &ExecutionOutcome) -> Map<String, Value> {
    let mut record = match outcome.detail() {
        Value::Object(fields) => fields.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("detail".to_string(), other.clone());
            map
        }
    };

    record.insert("test_name".into(), Value::from(outcome.test_name()));
    record.insert("status".into(), Value::from(outcome.status().as_str()));
    record.insert("run_timestamp".into(), Value::from(outcome.started_at().to_rfc3339()));
    let seconds = (outcome.duration().as_secs_f64() * 1000.0).round() / 1000.0;
    record.insert("duration_seconds".into(), Value::from(seconds));
    if let Some(message) = outcome.error_message() {
        record.insert("error_message".into(), Value::from(message));
    }
    record
}

/// On-disk format for saved results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SaveFormat {
    Json,
    Csv,
}

impl SaveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SaveFormat::Json => "json",
            SaveFormat::Csv => "csv",
        }
    }

    /// Build the matching file sink rooted at `dir`.
    pub fn sink(self, dir: impl Into<PathBuf>) -> Box<dyn FileSink> {
        match self {
            SaveFormat::Json => Box::new(JsonFileSink::new(dir)),
            SaveFormat::Csv => Box::new(CsvFileSink::new(dir)),
        }
    }
}

impl std::str::FromStr for SaveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(SaveFormat::Json),
            "csv" => Ok(SaveFormat::Csv),
            other => Err(format!("unknown save format `{other}` (expected json or csv)")),
        }
    }
}

/// A sink that writes files and can say where the last one went.
pub trait FileSink: ResultSink {
    fn last_path(&self) -> Option<&Path>;
}

/// `<test>-<YYYYmmdd_HHMMSS>.<ext>` with the test name made filesystem-safe.
pub fn result_file_name(test_name: &str, extension: &str) -> String {
    let stem: String = test_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("{stem}-{stamp}.{extension}")
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SinkError + '_ {
    move |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
struct Target {
    dir: PathBuf,
    file_name: Option<String>,
    last_path: Option<PathBuf>,
}

impl Target {
    fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file_name: None,
            last_path: None,
        }
    }

    fn path_for(&self, outcome: &ExecutionOutcome, extension: &str) -> Result<PathBuf, SinkError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let name = match &self.file_name {
            Some(name) => name.clone(),
            None => result_file_name(outcome.test_name(), extension),
        };
        Ok(self.dir.join(name))
    }
}

/// Writes each outcome as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    target: Target,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { target: Target::new(dir) }
    }

    /// Always write to this file name instead of a timestamped one.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.target.file_name = Some(name.into());
        self
    }
}

impl ResultSink for JsonFileSink {
    fn accept(&mut self, outcome: ExecutionOutcome) -> Result<(), SinkError> {
        let path = self.target.path_for(&outcome, "json")?;
        let mut text = serde_json::to_string_pretty(&Value::Object(enrich(&outcome)))?;
        text.push('\n');
        fs::write(&path, text).map_err(io_error(&path))?;
        tracing::info!(path = %path.display(), "result saved");
        self.target.last_path = Some(path);
        Ok(())
    }
}

impl FileSink for JsonFileSink {
    fn last_path(&self) -> Option<&Path> {
        self.target.last_path.as_deref()
    }
}

/// Writes each outcome as one CSV row under a header of sorted keys.
///
/// An existing file is appended to without repeating the header.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    target: Target,
}

impl CsvFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { target: Target::new(dir) }
    }

    /// Always write to this file name instead of a timestamped one.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.target.file_name = Some(name.into());
        self
    }
}

/// Text for one CSV cell: null is empty, strings are raw, nested values are JSON.
fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_line<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    let mut line = fields.map(csv_escape).collect::<Vec<_>>().join(",");
    line.push_str("\r\n");
    line
}

impl ResultSink for CsvFileSink {
    fn accept(&mut self, outcome: ExecutionOutcome) -> Result<(), SinkError> {
        let path = self.target.path_for(&outcome, "csv")?;
        let record = enrich(&outcome);
        let mut keys: Vec<&String> = record.keys().collect();
        keys.sort();

        let write_header = !path.exists();
        let mut text = String::new();
        if write_header {
            text.push_str(&csv_line(keys.iter().map(|k| k.as_str())));
        }
        let cells: Vec<String> = keys.iter().map(|k| csv_cell(&record[k.as_str()])).collect();
        text.push_str(&csv_line(cells.iter().map(String::as_str)));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_error(&path))?;
        file.write_all(text.as_bytes()).map_err(io_error(&path))?;
        tracing::info!(path = %path.display(), header = write_header, "result saved");
        self.target.last_path = Some(path);
        Ok(())
    }
}

impl FileSink for CsvFileSink {
    fn last_path(&self) -> Option<&Path> {
        self.target.last_path.as_deref()
    }
}

/// Prints a status line and the enriched record as pretty JSON.
pub struct ConsoleSink<W: Write> {
    out: W,
    color: bool,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn status_label(&self, status: OutcomeStatus) -> String {
        if !self.color {
            return status.as_str().to_uppercase();
        }
        let color = match status {
            OutcomeStatus::Succeeded => "\x1b[1;32m",
            OutcomeStatus::Failed => "\x1b[1;31m",
            OutcomeStatus::TimedOut | OutcomeStatus::ErroredInSetup => "\x1b[1;33m",
        };
        format!("{color}{}\x1b[0m", status.as_str().to_uppercase())
    }
}

impl<W: Write> ResultSink for ConsoleSink<W> {
    fn accept(&mut self, outcome: ExecutionOutcome) -> Result<(), SinkError> {
        let label = self.status_label(outcome.status());
        let pretty = serde_json::to_string_pretty(&Value::Object(enrich(&outcome)))?;
        writeln!(
            self.out,
            "{label} {} ({:.3}s)",
            outcome.test_name(),
            outcome.duration().as_secs_f64()
        )
        .and_then(|()| writeln!(self.out, "{pretty}"))
        .and_then(|()| self.out.flush())
        .map_err(SinkError::Console)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use sectoolbox_core::{CandidateSet, ResolvedInputs, RunContext, RunResult, SecurityTest, TestFailure};
    use serde_json::json;

    use crate::engine::execute;
    use crate::registry::discover;

    struct Fixed(Result<Value, String>);

    impl SecurityTest for Fixed {
        fn name(&self) -> &str {
            "header check"
        }
        fn description(&self) -> &str {
            "fixed outcome"
        }
        fn run(&self, _inputs: &ResolvedInputs, _ctx: &RunContext) -> RunResult {
            self.0.clone().map_err(TestFailure::new)
        }
    }

    fn outcome(result: Result<Value, String>) -> ExecutionOutcome {
        let mut set = CandidateSet::new();
        set.register("stub::fixed", move || Ok(Arc::new(Fixed(result)) as Arc<dyn SecurityTest>));
        let catalog = discover(set).catalog;
        execute(catalog.lookup("header check").unwrap(), ResolvedInputs::new(), Duration::from_secs(5))
    }

    #[test]
    fn test_enrich_merges_detail_and_metadata() {
        let record = enrich(&outcome(Ok(json!({"missing": ["csp"], "status": "ignored"}))));
        assert_eq!(record["missing"], json!(["csp"]));
        assert_eq!(record["test_name"], json!("header check"));
        assert_eq!(record["status"], json!("succeeded"));
        assert!(record["duration_seconds"].is_f64());
        assert!(record["run_timestamp"].as_str().unwrap().contains('T'));
        assert!(!record.contains_key("error_message"));
    }

    #[test]
    fn test_enrich_failure_carries_message_and_wraps_scalars() {
        let record = enrich(&outcome(Err("boom".into())));
        assert_eq!(record["status"], json!("failed"));
        assert_eq!(record["error_message"], json!("boom"));

        let record = enrich(&outcome(Ok(json!(42))));
        assert_eq!(record["detail"], json!(42));
    }

    #[test]
    fn test_json_sink_writes_pretty_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonFileSink::new(dir.path().join("results"));
        sink.accept(outcome(Ok(json!({"present": 3})))).unwrap();

        let path = sink.last_path().unwrap().to_path_buf();
        let file_name = path.file_name().unwrap().to_str().unwrap();
        assert!(file_name.starts_with("header_check-"), "{file_name}");
        assert!(file_name.ends_with(".json"));

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["present"], json!(3));
        assert_eq!(written["test_name"], json!("header check"));
    }

    #[test]
    fn test_csv_sink_appends_without_repeating_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvFileSink::new(dir.path()).with_file_name("runs.csv");
        sink.accept(outcome(Ok(json!({"note": "a, b", "tags": ["x"], "gone": null}))))
            .unwrap();
        sink.accept(outcome(Ok(json!({"note": "say \"hi\"", "tags": [], "gone": null}))))
            .unwrap();

        let text = fs::read_to_string(dir.path().join("runs.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3, "{text}");
        assert_eq!(
            lines[0],
            "duration_seconds,gone,note,run_timestamp,status,tags,test_name"
        );
        assert!(lines[1].contains(",,\"a, b\","), "{}", lines[1]);
        assert!(lines[1].contains("\"[\"\"x\"\"]\""), "{}", lines[1]);
        assert!(lines[2].contains("\"say \"\"hi\"\"\""), "{}", lines[2]);
        assert!(lines[2].ends_with(",succeeded,[],header check"), "{}", lines[2]);
    }

    #[test]
    fn test_console_sink_plain_output() {
        let mut sink = ConsoleSink::new(Vec::new(), false);
        sink.accept(outcome(Err("refused".into()))).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.starts_with("FAILED header check ("), "{text}");
        assert!(text.contains("\"error_message\": \"refused\""));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn test_console_sink_colors_status() {
        let mut sink = ConsoleSink::new(Vec::new(), true);
        sink.accept(outcome(Ok(json!({})))).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.starts_with("\x1b[1;32mSUCCEEDED\x1b[0m"));
    }

    #[test]
    fn test_vec_sink_collects() {
        let mut sink: Vec<ExecutionOutcome> = Vec::new();
        sink.accept(outcome(Ok(json!(null)))).unwrap();
        assert_eq!(sink.len(), 1);
        assert!(sink[0].is_success());
    }

    #[test]
    fn test_save_format_parsing() {
        assert_eq!("JSON".parse::<SaveFormat>(), Ok(SaveFormat::Json));
        assert_eq!(" csv ".parse::<SaveFormat>(), Ok(SaveFormat::Csv));
        assert!("n".parse::<SaveFormat>().is_err());
    }
}
