//! Launcher script parsing.
//!
//! A launcher is the small batch script an executor's command points at. It
//! changes into a working directory and invokes one or more scripts through
//! an interpreter; each such invocation becomes a task candidate.

use std::fs;
use std::path::Path;

use crate::error::ScriptParseError;

/// One script invocation discovered in a launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCandidate {
    /// Base filename of the script, without extension.
    pub script_id: String,
    /// Full script path as written in the launcher.
    pub script: String,
    /// The launcher the invocation was found in.
    pub command: String,
    /// Working directory in effect on the invocation line.
    pub run_dir: String,
    /// The invocation line, quotes stripped.
    pub execution_command: String,
}

/// Line scanner for launcher scripts.
///
/// Lines starting `::` are comments. A `cd ` line updates the in-effect run
/// directory (last one wins; the check is not suppressed on comment lines).
/// A non-comment line containing the interpreter marker and a quoted final
/// argument yields a candidate; candidates are keyed by script path, so a
/// repeated invocation of the same script keeps its first position but the
/// last line wins.
#[derive(Debug, Clone)]
pub struct ScriptParser {
    interpreter: String,
}

impl Default for ScriptParser {
    fn default() -> Self {
        Self {
            interpreter: "python.exe".to_string(),
        }
    }
}

impl ScriptParser {
    /// A parser recognizing a different interpreter marker.
    pub fn with_interpreter(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    /// Read and parse a launcher from disk. A missing or unreadable file is
    /// the per-file failure the reconciler records as a warning and skips.
    pub fn parse_file(&self, path: &Path) -> Result<Vec<TaskCandidate>, ScriptParseError> {
        let contents = fs::read_to_string(path).map_err(|source| ScriptParseError {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.parse(&contents, &path.to_string_lossy()))
    }

    /// Parse launcher contents. `launcher` tags every candidate as the
    /// owning command.
    pub fn parse(&self, contents: &str, launcher: &str) -> Vec<TaskCandidate> {
        let mut candidates: Vec<TaskCandidate> = Vec::new();
        let mut run_dir = String::new();

        for line in contents.lines() {
            if let Some(rest) = line.strip_prefix("cd ") {
                run_dir = rest.replace('"', "").trim().to_string();
            }
            if line.starts_with("::") || !line.contains(&self.interpreter) {
                continue;
            }
            let Some(script) = final_quoted_argument(line) else {
                continue;
            };
            let candidate = TaskCandidate {
                script_id: script_identifier(script),
                script: script.to_string(),
                command: launcher.to_string(),
                run_dir: run_dir.clone(),
                execution_command: line.replace('"', "").trim().to_string(),
            };
            match candidates.iter_mut().find(|c| c.script == candidate.script) {
                Some(existing) => *existing = candidate,
                None => candidates.push(candidate),
            }
        }
        candidates
    }
}

/// The contents of the last double-quoted argument on the line.
fn final_quoted_argument(line: &str) -> Option<&str> {
    let mut last = None;
    let mut inside = false;
    for part in line.split('"') {
        if inside && !part.trim().is_empty() {
            last = Some(part);
        }
        inside = !inside;
    }
    last
}

/// Base filename without its extension, tolerating both path separators.
fn script_identifier(script: &str) -> String {
    let base = script.rsplit(['\\', '/']).next().unwrap_or(script);
    match base.rfind('.') {
        Some(idx) if idx > 0 => base[..idx].to_string(),
        _ => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(contents: &str) -> Vec<TaskCandidate> {
        ScriptParser::default().parse(contents, "C:\\jobs\\nightly.bat")
    }

    #[test]
    fn extracts_one_candidate_per_invocation_line() {
        let launcher = "cd \"C:\\work\"\n\
                        \"C:\\Python\\python.exe\" \"C:\\scripts\\extract.py\"\n\
                        \"C:\\Python\\python.exe\" \"C:\\scripts\\load.py\"\n";
        let candidates = parse(launcher);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].script_id, "extract");
        assert_eq!(candidates[0].script, "C:\\scripts\\extract.py");
        assert_eq!(candidates[1].script_id, "load");
        assert_eq!(candidates[0].command, "C:\\jobs\\nightly.bat");
    }

    #[test]
    fn comment_lines_yield_no_candidates() {
        let launcher = ":: \"C:\\Python\\python.exe\" \"C:\\scripts\\old.py\"\n\
                        \"C:\\Python\\python.exe\" \"C:\\scripts\\current.py\"\n";
        let candidates = parse(launcher);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].script_id, "current");
    }

    #[test]
    fn run_dir_is_inherited_and_last_one_wins() {
        let launcher = "cd \"C:\\first\"\n\
                        \"C:\\Python\\python.exe\" \"C:\\scripts\\a.py\"\n\
                        cd C:\\second\n\
                        \"C:\\Python\\python.exe\" \"C:\\scripts\\b.py\"\n";
        let candidates = parse(launcher);
        assert_eq!(candidates[0].run_dir, "C:\\first");
        assert_eq!(candidates[1].run_dir, "C:\\second");
    }

    #[test]
    fn invocation_before_any_cd_has_empty_run_dir() {
        let launcher = "\"C:\\Python\\python.exe\" \"C:\\scripts\\a.py\"\n";
        assert_eq!(parse(launcher)[0].run_dir, "");
    }

    #[test]
    fn duplicate_script_keeps_position_but_last_line_wins() {
        let launcher = "\"C:\\Python\\python.exe\" \"C:\\scripts\\a.py\"\n\
                        \"C:\\Python\\python.exe\" \"C:\\scripts\\b.py\"\n\
                        cd C:\\later\n\
                        \"C:\\Python\\python.exe\" \"C:\\scripts\\a.py\"\n";
        let candidates = parse(launcher);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].script, "C:\\scripts\\a.py");
        assert_eq!(candidates[0].run_dir, "C:\\later");
        assert_eq!(candidates[1].script, "C:\\scripts\\b.py");
    }

    #[test]
    fn execution_command_is_full_line_without_quotes() {
        let launcher = "\"C:\\Python\\python.exe\" \"C:\\scripts\\a.py\" --full\n";
        assert_eq!(
            parse(launcher)[0].execution_command,
            "C:\\Python\\python.exe C:\\scripts\\a.py --full",
        );
    }

    #[test]
    fn lines_without_interpreter_are_ignored() {
        let launcher = "echo starting\n\
                        copy \"C:\\in.csv\" \"C:\\out.csv\"\n";
        assert!(parse(launcher).is_empty());
    }

    #[test]
    fn interpreter_line_without_quoted_argument_is_ignored() {
        let launcher = "python.exe bare_script.py\n";
        assert!(parse(launcher).is_empty());
    }

    #[test]
    fn interpreter_marker_is_configurable() {
        let parser = ScriptParser::with_interpreter("Rscript.exe");
        let launcher = "\"C:\\R\\Rscript.exe\" \"C:\\scripts\\model.R\"\n";
        let candidates = parser.parse(launcher, "C:\\jobs\\model.bat");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].script_id, "model");
    }

    #[test]
    fn run_dir_tracking_is_not_suppressed_by_comment_state() {
        // The cd check runs on every line, comment or not; only invocation
        // detection is comment-aware.
        let launcher = "cd \"C:\\real\"\n\
                        :: python.exe \"C:\\scripts\\disabled.py\"\n\
                        \"C:\\Python\\python.exe\" \"C:\\scripts\\live.py\"\n";
        let candidates = parse(launcher);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].run_dir, "C:\\real");
    }

    #[test]
    fn script_identifier_strips_path_and_extension() {
        assert_eq!(script_identifier("C:\\scripts\\etl_job.py"), "etl_job");
        assert_eq!(script_identifier("relative/path/report.v2.py"), "report.v2");
        assert_eq!(script_identifier("noext"), "noext");
        assert_eq!(script_identifier(".hidden"), ".hidden");
    }
}
