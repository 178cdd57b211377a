//! The parser seam between the worker pool and the plugin format.
//!
//! The pool never looks inside a plugin. Each worker owns one [`PluginParser`] built by a
//! shared [`ParserFactory`], hands it the file bytes, and reports back a hash plus either a
//! [`ParsedPlugin`] or a failure reason.
//!
//! Two adapters ship with the crate:
//! - [`DumpParser`]: the bytes already hold a JSON cell dump
//! - [`CommandParser`]: pipes the bytes through an external cell dumper and decodes its
//!   JSON output

use crate::models::{ParsedPlugin, PipelineSettings};
use sha2::{Digest, Sha256};
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::sync::Arc;
use thiserror::Error;

/// Errors a parser can report for a single file.
///
/// These never fail the pipeline; they end up as the record's failure reason.
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Invalid cell dump: {0}")]
    InvalidDump(#[from] serde_json::Error),

    #[error("Parser process error: {0}")]
    Io(#[from] io::Error),

    #[error("Parser command exited with code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("{0}")]
    Other(String),
}

/// Parses plugin bytes into a structured record.
///
/// A parser instance lives on one worker thread for the worker's whole life, so it may
/// keep internal buffers between calls.
#[cfg_attr(test, mockall::automock)]
pub trait PluginParser {
    fn parse(&mut self, contents: &[u8]) -> Result<ParsedPlugin, ParserError>;

    /// Content fingerprint; computed even when parsing is skipped.
    fn hash(&self, contents: &[u8]) -> String {
        hash_plugin(contents)
    }
}

/// Builds one parser per worker.
pub trait ParserFactory: Send + Sync {
    fn create_parser(&self) -> Box<dyn PluginParser>;
}

impl<F> ParserFactory for F
where
    F: Fn() -> Box<dyn PluginParser> + Send + Sync,
{
    fn create_parser(&self) -> Box<dyn PluginParser> {
        self()
    }
}

/// Base-36 fingerprint of plugin contents (first 64 bits of SHA-256).
pub fn hash_plugin(contents: &[u8]) -> String {
    let digest = Sha256::digest(contents);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    to_base36(u64::from_be_bytes(prefix))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize] as char);
        value /= 36;
    }
    digits.iter().rev().collect()
}

/// Decodes bytes that already hold a JSON cell dump.
#[derive(Debug, Default, Clone)]
pub struct DumpParser;

impl PluginParser for DumpParser {
    fn parse(&mut self, contents: &[u8]) -> Result<ParsedPlugin, ParserError> {
        Ok(serde_json::from_slice(contents)?)
    }
}

/// Runs an external cell dumper per file: plugin bytes on stdin, JSON dump on stdout.
#[derive(Debug, Clone)]
pub struct CommandParser {
    program: String,
    args: Vec<String>,
}

impl CommandParser {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl PluginParser for CommandParser {
    fn parse(&mut self, contents: &[u8]) -> Result<ParsedPlugin, ParserError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ParserError::Other("parser stdin unavailable".to_string()))?;

        // Feed stdin from a second thread so a chatty dumper cannot fill its stdout
        // pipe while we are still writing.
        let (output, written) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || stdin.write_all(contents));
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));
            (output, written)
        });

        let output = output?;
        if !output.status.success() {
            return Err(ParserError::CommandFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written?;

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// Pick the parser adapter configured in the pipeline settings.
pub fn parser_factory(settings: &PipelineSettings) -> Arc<dyn ParserFactory> {
    if settings.parser_command.trim().is_empty() {
        tracing::info!("No parser command configured, reading pre-dumped plugin records");
        return Arc::new(|| -> Box<dyn PluginParser> { Box::new(DumpParser) });
    }

    let program = settings.parser_command.clone();
    let args = settings.parser_args.clone();
    tracing::info!("Using parser command: {} {}", program, args.join(" "));

    Arc::new(move || -> Box<dyn PluginParser> {
        Box::new(CommandParser::new(program.clone(), args.clone()))
    })
}
