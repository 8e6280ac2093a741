//! FileCheck-style test validation for `.tir` files.
//!
//! A test file carries its own commands and expectations in comments:
//!
//! ```text
//! ; RUN: sysmips --print-dom --no-opt %s
//! ; CHECK-LABEL: Dominators for func main
//! ; CHECK: exit: idom=entry
//! ; CHECK-NOT: unreachable
//! ```
//!
//! Every `RUN` line compiles the file with its flags and the output is
//! matched against the directives, top to bottom, with substring matches.

use super::compiler::{render_dumps, Dump};
use super::parser::parse_module;
use crate::core::{CompilationSession, CompilerOptions, RegisterBudget};
use bumpalo::Bump;

/// A CHECK directive extracted from a test file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match on this or any later line
    Check(String),
    /// CHECK-LABEL: pattern - Label for a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-NOT: pattern - Absent up to the next positive match
    CheckNot(String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

/// A RUN directive specifying how to execute the test
#[derive(Debug, Clone)]
pub struct RunDirective {
    pub command: String,
    pub args: Vec<String>,
}

impl RunDirective {
    /// Pipeline options and dumps selected by the flags.
    pub fn configuration(&self) -> Result<(CompilerOptions, Vec<Dump>), String> {
        let mut options = CompilerOptions::default();
        let mut dumps = Vec::new();
        let mut args = self.args.iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--no-opt" => options.optimize = false,
                "--regs" => {
                    let n: usize = args
                        .next()
                        .and_then(|n| n.parse().ok())
                        .ok_or_else(|| "--regs needs a register count".to_string())?;
                    options.registers = RegisterBudget::first(n);
                }
                "%s" => {}
                flag => match Dump::from_flag(flag) {
                    Some(dump) => dumps.push(dump),
                    None => return Err(format!("unknown RUN flag '{}'", flag)),
                },
            }
        }
        Ok((options, dumps))
    }
}

/// Test specification extracted from a test file
#[derive(Debug)]
pub struct TestSpec {
    pub run_directives: Vec<RunDirective>,
    pub check_directives: Vec<CheckDirective>,
    /// The whole file; directives are comments to the IR reader, so line
    /// numbers in parse errors match the file.
    pub tir_content: String,
}

impl TestSpec {
    /// Extract the directives of a test file
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut run_directives = Vec::new();
        let mut check_directives = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(run_cmd) = trimmed.strip_prefix("; RUN:") {
                let parts: Vec<&str> = run_cmd.split_whitespace().collect();
                if let Some((command, args)) = parts.split_first() {
                    run_directives.push(RunDirective {
                        command: command.to_string(),
                        args: args.iter().map(|s| s.to_string()).collect(),
                    });
                }
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-LABEL:") {
                check_directives.push(CheckDirective::CheckLabel(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NEXT:") {
                check_directives.push(CheckDirective::CheckNext(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NOT:") {
                check_directives.push(CheckDirective::CheckNot(pattern.trim().to_string()));
            } else if trimmed.starts_with("; CHECK-EMPTY") {
                check_directives.push(CheckDirective::CheckEmpty);
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK:") {
                check_directives.push(CheckDirective::Check(pattern.trim().to_string()));
            } else if let Some(comment) = trimmed.strip_prefix("; COM:") {
                check_directives.push(CheckDirective::Comment(comment.trim().to_string()));
            } else if trimmed.starts_with("; CHECK") {
                return Err(format!("unknown directive '{}'", trimmed));
            }
        }

        if run_directives.is_empty() {
            return Err("test has no RUN line".to_string());
        }

        Ok(TestSpec {
            run_directives,
            check_directives,
            tir_content: content.to_string(),
        })
    }
}

/// Test runner that executes `.tir` tests
pub struct TestRunner {
    verbose: bool,
}

impl TestRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Run every RUN line of a test and validate its output
    pub fn run_test(&self, spec: &TestSpec) -> Result<(), String> {
        for run_dir in &spec.run_directives {
            let output = self.execute_command(&spec.tir_content, run_dir)?;
            if self.verbose {
                println!("{}", output);
            }
            self.validate_output(&output, &spec.check_directives)?;
        }
        Ok(())
    }

    /// Compile the test source with one RUN line's flags
    pub fn execute_command(&self, source: &str, run_dir: &RunDirective) -> Result<String, String> {
        let (options, dumps) = run_dir.configuration()?;
        let mut module = parse_module(source).map_err(|e| e.to_string())?;
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        render_dumps(&session, &mut module, options, &dumps).map_err(|e| e.to_string())
    }

    /// Validate output against CHECK directives
    pub fn validate_output(&self, output: &str, directives: &[CheckDirective]) -> Result<(), String> {
        let output_lines: Vec<&str> = output.lines().collect();
        let mut line_idx = 0;
        let mut pending_not: Vec<&str> = Vec::new();

        // A CHECK-NOT covers the lines skipped before the next match.
        let check_nots = |pending: &mut Vec<&str>, from: usize, to: usize| -> Result<(), String> {
            for pattern in pending.drain(..) {
                if let Some(line) = output_lines[from..to].iter().find(|l| l.contains(pattern)) {
                    return Err(format!("CHECK-NOT: pattern '{}' found in '{}'", pattern, line));
                }
            }
            Ok(())
        };

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::CheckNot(pattern) => pending_not.push(pattern),

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let kind = if matches!(directive, CheckDirective::Check(_)) {
                        "CHECK"
                    } else {
                        "CHECK-LABEL"
                    };
                    let found = output_lines
                        .iter()
                        .skip(line_idx)
                        .position(|line| line.contains(pattern.as_str()));

                    match found {
                        Some(idx) => {
                            check_nots(&mut pending_not, line_idx, line_idx + idx)?;
                            line_idx += idx + 1;
                            if self.verbose {
                                println!("{}: '{}' found at line {}", kind, pattern, line_idx - 1);
                            }
                        }
                        None => {
                            return Err(format!("{}: pattern '{}' not found in output", kind, pattern));
                        }
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    if line_idx >= output_lines.len() {
                        return Err(format!("CHECK-NEXT: no more lines, expected '{}'", pattern));
                    }

                    let line = output_lines[line_idx];
                    if !line.contains(pattern.as_str()) {
                        return Err(format!("CHECK-NEXT: expected '{}' but got '{}'", pattern, line));
                    }
                    check_nots(&mut pending_not, line_idx, line_idx)?;

                    if self.verbose {
                        println!("CHECK-NEXT: '{}' matches at line {}", pattern, line_idx);
                    }
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    if line_idx >= output_lines.len() {
                        continue; // End of output counts as empty
                    }

                    let line = output_lines[line_idx];
                    if !line.trim().is_empty() {
                        return Err(format!("CHECK-EMPTY: expected empty line but got '{}'", line));
                    }

                    if self.verbose {
                        println!("CHECK-EMPTY: matches at line {}", line_idx);
                    }
                    line_idx += 1;
                }
            }
        }

        check_nots(&mut pending_not, line_idx, output_lines.len())
    }
}
