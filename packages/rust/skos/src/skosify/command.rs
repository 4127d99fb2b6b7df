//! Out-of-process SKOS repair through an external `skosify` executable.
//!
//! The graph is written to a scratch Turtle file, the executable rewrites it
//! into a second file, and the result replaces the working graph.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use oxigraph::model::Graph;
use tracing::{debug, info};

use vocabsync_shared::{Result, VocabError, VocabFormat};

use super::{Skosify, SkosifyOptions, SkosifyReport};
use crate::io::{parse_file, write_turtle};

/// Runs `<command> <extra_args..> <flags..> -o <output> <input>`.
#[derive(Debug, Clone)]
pub struct SkosifyCommand {
    command: String,
    extra_args: Vec<String>,
}

impl SkosifyCommand {
    pub fn new(command: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            extra_args,
        }
    }

    /// Arguments for one invocation.
    fn arguments(&self, options: &SkosifyOptions, input: &Path, output: &Path) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend([
            "--label".to_string(),
            options.label.clone(),
            "--namespace".to_string(),
            options.namespace.clone(),
        ]);
        if let Some(lang) = &options.default_language {
            args.extend(["--default-language".to_string(), lang.clone()]);
        }

        // (wanted, skosify's own default, flag that flips that default)
        let toggles = [
            (options.mark_top_concepts, true, "--no-mark-top-concepts"),
            (options.eliminate_redundancy, false, "--eliminate-redundancy"),
            (options.break_cycles, false, "--break-cycles"),
            (options.cleanup_related, true, "--keep-related"),
            (options.cleanup_classes, false, "--cleanup-classes"),
            (options.cleanup_properties, false, "--cleanup-properties"),
            (options.cleanup_unreachable, false, "--cleanup-unreachable"),
        ];
        args.extend(
            toggles
                .into_iter()
                .filter(|(wanted, default, _)| wanted != default)
                .map(|(_, _, flag)| flag.to_string()),
        );

        args.extend([
            "-o".to_string(),
            output.display().to_string(),
            input.display().to_string(),
        ]);
        args
    }

    fn scratch_dir() -> Result<PathBuf> {
        let dir = std::env::temp_dir().join(format!("vocabsync_skosify_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).map_err(|e| VocabError::io(&dir, e))?;
        Ok(dir)
    }

    fn run(&self, graph: &mut Graph, options: &SkosifyOptions, dir: &Path) -> Result<()> {
        let input = dir.join("input.ttl");
        let output = dir.join("output.ttl");
        write_turtle(graph, &input)?;

        let args = self.arguments(options, &input, &output);
        info!(cmd = %self.command, "spawning skosify");
        debug!(?args, "skosify arguments");

        let result = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                VocabError::Skosify(format!(
                    "failed to spawn skosify: {e}. Is `{}` installed?",
                    self.command
                ))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(VocabError::Skosify(format!(
                "`{}` exited with {}: {}",
                self.command,
                result.status,
                stderr.trim()
            )));
        }

        let repaired = parse_file(&output, VocabFormat::Turtle, None)
            .map_err(|e| VocabError::Skosify(format!("unreadable skosify output: {e}")))?;
        *graph = repaired;
        Ok(())
    }
}

impl Skosify for SkosifyCommand {
    fn name(&self) -> &'static str {
        "command"
    }

    fn skosify(&self, graph: &mut Graph, options: &SkosifyOptions) -> Result<SkosifyReport> {
        if options.label.trim().is_empty() {
            return Err(VocabError::Skosify("a concept scheme label is required".into()));
        }

        let dir = Self::scratch_dir()?;
        let outcome = self.run(graph, options, &dir);
        let _ = std::fs::remove_dir_all(&dir);
        outcome?;

        // The executable does not report what it changed.
        Ok(SkosifyReport::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_carry_options_and_paths() {
        let cmd = SkosifyCommand::new("skosify", vec!["--debug".into()]);
        let mut options = SkosifyOptions::new("Example", "http://ex.org/v/")
            .with_default_language(Some("de".into()));
        options.cleanup_related = false;

        let args = cmd.arguments(&options, Path::new("/tmp/in.ttl"), Path::new("/tmp/out.ttl"));
        assert_eq!(
            args,
            [
                "--debug",
                "--label",
                "Example",
                "--namespace",
                "http://ex.org/v/",
                "--default-language",
                "de",
                "--eliminate-redundancy",
                "--break-cycles",
                "--keep-related",
                "--cleanup-classes",
                "--cleanup-properties",
                "--cleanup-unreachable",
                "-o",
                "/tmp/out.ttl",
                "/tmp/in.ttl",
            ]
        );
    }

    #[test]
    fn tool_defaults_add_no_flags() {
        let cmd = SkosifyCommand::new("skosify", Vec::new());
        let mut options = SkosifyOptions::new("Example", "http://ex.org/v/");
        options.eliminate_redundancy = false;
        options.break_cycles = false;
        options.cleanup_classes = false;
        options.cleanup_properties = false;
        options.cleanup_unreachable = false;

        let args = cmd.arguments(&options, Path::new("in.ttl"), Path::new("out.ttl"));
        assert_eq!(
            args,
            ["--label", "Example", "--namespace", "http://ex.org/v/", "-o", "out.ttl", "in.ttl"]
        );

        options.mark_top_concepts = false;
        let args = cmd.arguments(&options, Path::new("in.ttl"), Path::new("out.ttl"));
        assert!(args.contains(&"--no-mark-top-concepts".to_string()));
    }

    #[test]
    fn missing_executable_is_skosify_error() {
        let cmd = SkosifyCommand::new("vocabsync-no-such-skosify", Vec::new());
        let mut graph = Graph::new();
        let err = cmd
            .skosify(&mut graph, &SkosifyOptions::new("Example", "http://ex.org/v/"))
            .unwrap_err();
        assert!(matches!(err, VocabError::Skosify(_)));
        assert!(err.to_string().contains("vocabsync-no-such-skosify"));
    }

    #[test]
    fn failing_executable_reports_status() {
        let cmd = SkosifyCommand::new("false", Vec::new());
        let mut graph = Graph::new();
        let err = cmd
            .skosify(&mut graph, &SkosifyOptions::new("Example", "http://ex.org/v/"))
            .unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }
}
