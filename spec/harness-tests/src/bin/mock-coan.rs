//! A stand-in for coan that honours its external contract.
//!
//! Understands enough of the command line and of conditional directives to
//! exercise the harness: `#ifdef`/`#ifndef`/`#if defined`/`#if 0|1` are
//! resolved against `-D`/`-U` symbols and transient `#define`/`#undef`s;
//! unresolved groups are kept verbatim. Unbalanced conditionals are parse
//! errors and the file is abandoned.
//!
//! A file named `mock-coan.leak` beside the executable makes transient
//! symbols survive from one input file to the next, which is the defect the
//! rewind suite exists to catch.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use walkdir::WalkDir;

const ERROR_BIT: u32 = 0x08;
const DROPPED_BIT: u32 = 0x01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Symbols,
    Source,
    Spin,
}

#[derive(Parser, Debug)]
#[command(name = "coan")]
struct Args {
    mode: Mode,

    #[arg(short = 'D', value_name = "SYM")]
    define: Vec<String>,

    #[arg(short = 'U', value_name = "SYM")]
    undef: Vec<String>,

    /// Read more options from FILE
    #[arg(long)]
    file: Option<PathBuf>,

    #[arg(long, value_delimiter = ',')]
    filter: Vec<String>,

    #[arg(long)]
    recurse: bool,

    #[arg(long)]
    keepgoing: bool,

    #[arg(long)]
    verbose: bool,

    #[arg(long)]
    replace: bool,

    #[arg(long)]
    backup: Option<String>,

    #[arg(long)]
    once_only: bool,

    #[arg(long)]
    dir: Option<PathBuf>,

    #[arg(long)]
    prefix: Option<String>,

    inputs: Vec<String>,
}

#[derive(Default)]
struct Symbols {
    defined: HashSet<String>,
    undefined: HashSet<String>,
}

impl Symbols {
    fn eval(&self, sym: &str, transient: &Symbols) -> Option<bool> {
        if self.defined.contains(sym) || transient.defined.contains(sym) {
            Some(true)
        } else if self.undefined.contains(sym) || transient.undefined.contains(sym) {
            Some(false)
        } else {
            None
        }
    }

    fn configured(&self, sym: &str) -> bool {
        self.defined.contains(sym) || self.undefined.contains(sym)
    }
}

struct Frame {
    value: Option<bool>,
    in_else: bool,
    outer: bool,
    line: usize,
}

impl Frame {
    fn active(&self) -> bool {
        self.outer && self.value.is_none_or(|v| v != self.in_else)
    }
}

struct Processed {
    output: String,
    symbols: Vec<String>,
    dropped: bool,
}

struct ParseError {
    line: usize,
    message: &'static str,
}

fn symbol_of(rest: &str) -> Option<String> {
    let rest = rest.trim_start();
    let rest = rest.strip_prefix("defined").map(str::trim_start).unwrap_or(rest);
    let rest = rest.strip_prefix('(').unwrap_or(rest);
    let sym: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    (!sym.is_empty() && !sym.starts_with(|c: char| c.is_ascii_digit())).then_some(sym)
}

fn process(text: &str, config: &Symbols, transient: &mut Symbols) -> Result<Processed, ParseError> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut out = Processed {
        output: String::new(),
        symbols: Vec::new(),
        dropped: false,
    };
    for (idx, line) in text.split_inclusive('\n').enumerate() {
        let lineno = idx + 1;
        let active = stack.last().is_none_or(Frame::active);
        let emit = match line.trim_start().strip_prefix('#').map(str::trim_start) {
            Some(directive) => {
                let keyword: String = directive.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
                let rest = &directive[keyword.len()..];
                match keyword.as_str() {
                    "ifdef" | "ifndef" | "if" => {
                        let sym = symbol_of(rest);
                        if let Some(sym) = &sym {
                            out.symbols.push(sym.clone());
                        }
                        let value = match (keyword.as_str(), rest.trim()) {
                            ("if", "0") => Some(false),
                            ("if", "1") => Some(true),
                            ("if", r) if !r.starts_with("defined") => None,
                            ("ifndef", _) => sym.and_then(|s| config.eval(&s, transient)).map(|v| !v),
                            _ => sym.and_then(|s| config.eval(&s, transient)),
                        };
                        stack.push(Frame {
                            value,
                            in_else: false,
                            outer: active,
                            line: lineno,
                        });
                        active && value.is_none()
                    }
                    "else" => {
                        let Some(frame) = stack.last_mut() else {
                            return Err(ParseError {
                                line: lineno,
                                message: "#else without #if",
                            });
                        };
                        frame.in_else = true;
                        frame.outer && frame.value.is_none()
                    }
                    "endif" => {
                        let Some(frame) = stack.pop() else {
                            return Err(ParseError {
                                line: lineno,
                                message: "Unmatched #endif",
                            });
                        };
                        frame.outer && frame.value.is_none()
                    }
                    "define" | "undef" => {
                        if let Some(sym) = symbol_of(rest) {
                            out.symbols.push(sym.clone());
                            if active && !config.configured(&sym) {
                                if keyword == "define" {
                                    transient.undefined.remove(&sym);
                                    transient.defined.insert(sym);
                                } else {
                                    transient.defined.remove(&sym);
                                    transient.undefined.insert(sym);
                                }
                            }
                        }
                        active
                    }
                    _ => active,
                }
            }
            None => active,
        };
        if emit {
            out.output.push_str(line);
        } else {
            out.dropped = true;
        }
    }
    match stack.first() {
        Some(frame) => Err(ParseError {
            line: frame.line,
            message: "Unterminated #if",
        }),
        None => Ok(out),
    }
}

fn selected(path: &Path, filter: &[String]) -> bool {
    filter.is_empty()
        || path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| filter.iter().any(|f| f == e))
}

fn gather(inputs: &[String], filter: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut files = Vec::new();
    for input in inputs {
        let candidates: Vec<String> = if Path::new(input).is_dir() {
            WalkDir::new(input)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().display().to_string())
                .collect()
        } else {
            vec![input.clone()]
        };
        for file in candidates {
            // Linked duplicates are one file.
            let key = fs::canonicalize(&file).unwrap_or_else(|_| PathBuf::from(&file));
            if selected(Path::new(&file), filter) && seen.insert(key) {
                files.push(file);
            }
        }
    }
    files
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn overlaps(spin: &Path, input: &Path) -> bool {
    spin.starts_with(input) || input.starts_with(spin)
}

fn finish(code: u32, abnormal: bool, counts: Option<(usize, usize, usize)>) -> ! {
    let status = if abnormal {
        " ABNORMALLY"
    } else if code & ERROR_BIT != 0 {
        " with errors"
    } else if code & DROPPED_BIT != 0 {
        " with remarks"
    } else {
        ""
    };
    eprintln!("coan: progress 0x02101: Completed{status}, exit code 0x{code:02x}");
    if let Some((infiles, done, errors)) = counts {
        eprintln!(
            "coan: info 0x02201: {done} out of {infiles} input files were reached; {} files were not reached",
            infiles - done
        );
        eprintln!(
            "coan: info 0x02202: {} out of {done} files reached were valid; {errors} were abandoned due to parse errors",
            done - errors
        );
    }
    std::process::exit(code as i32);
}

fn main() {
    let args = Args::parse();
    let leak = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|d| d.join("mock-coan.leak")))
        .is_some_and(|marker| marker.exists());

    let mut config = Symbols::default();
    config.defined.extend(args.define.iter().cloned());
    config.undefined.extend(args.undef.iter().cloned());
    if let Some(file) = &args.file {
        let Ok(text) = fs::read(file).map(|b| String::from_utf8_lossy(&b).into_owned()) else {
            eprintln!("coan: error 0x00802: Cannot read file \"{}\"", file.display());
            finish(ERROR_BIT, false, None);
        };
        for token in text.split_whitespace() {
            if let Some(sym) = token.strip_prefix("-D") {
                config.defined.insert(sym.to_string());
            } else if let Some(sym) = token.strip_prefix("-U") {
                config.undefined.insert(sym.to_string());
            }
        }
    }

    if args.mode == Mode::Spin {
        let Some(dir) = &args.dir else {
            eprintln!("coan: error 0x00803: spin needs --dir");
            finish(ERROR_BIT, false, None);
        };
        let spin = absolute(dir);
        if args.inputs.iter().any(|i| overlaps(&spin, &absolute(Path::new(i)))) {
            eprintln!(
                "coan: abend 0x0100e: The spin directory cannot include or be included by or \
                 identical with any input directory"
            );
            finish(ERROR_BIT, true, None);
        }
    }

    let replace = args.replace || args.backup.is_some();
    let mut inputs = args.inputs.clone();
    let mut stdin_source = None;
    if inputs.is_empty() {
        if replace || args.mode == Mode::Spin {
            inputs = io::stdin()
                .lock()
                .lines()
                .map_while(Result::ok)
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
        } else {
            let mut text = String::new();
            if io::stdin().read_to_string(&mut text).is_err() {
                finish(ERROR_BIT, false, None);
            }
            stdin_source = Some(text);
        }
    }

    let files = match &stdin_source {
        Some(_) => vec!["[stdin]".to_string()],
        None => gather(&inputs, &args.filter),
    };
    if files.is_empty() {
        eprintln!("coan: error 0x00804: Nothing to do. No input files selected.");
        finish(ERROR_BIT, false, None);
    }

    let mut code = 0;
    let mut done = 0;
    let mut errors = 0;
    let mut transient = Symbols::default();
    let mut listed = HashSet::new();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    for file in &files {
        if !leak {
            transient = Symbols::default();
        }
        done += 1;
        let text = match &stdin_source {
            Some(text) => text.clone(),
            None => match fs::read(file) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(_) => {
                    eprintln!("coan: {file}: error 0x00802: Cannot read file");
                    code |= ERROR_BIT;
                    errors += 1;
                    continue;
                }
            },
        };
        let processed = match process(&text, &config, &mut transient) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("coan: {file}: line {}: error 0x0081c: {}", e.line, e.message);
                code |= ERROR_BIT;
                errors += 1;
                if args.keepgoing {
                    continue;
                }
                break;
            }
        };
        if processed.dropped {
            code |= DROPPED_BIT;
        }
        let written = match args.mode {
            Mode::Symbols => {
                if !args.once_only {
                    listed.clear();
                }
                let mut r = Ok(());
                for sym in processed.symbols {
                    if !config.configured(&sym) && listed.insert(sym.clone()) {
                        r = r.and(writeln!(stdout, "{sym}: unconfigured"));
                    }
                }
                r
            }
            Mode::Source if replace && stdin_source.is_none() => {
                let backup = args
                    .backup
                    .as_ref()
                    .map(|suffix| fs::copy(file, format!("{file}{suffix}")).map(|_| ()))
                    .unwrap_or(Ok(()));
                backup.and_then(|_| fs::write(file, &processed.output))
            }
            Mode::Source => stdout.write_all(processed.output.as_bytes()),
            Mode::Spin => {
                let spin = args.dir.clone().unwrap_or_default();
                let mut rel = file.as_str();
                if let Some(prefix) = args.prefix.as_deref().filter(|p| !p.is_empty()) {
                    rel = rel.strip_prefix(prefix).unwrap_or(rel);
                }
                let rel = rel.strip_prefix('/').unwrap_or(rel);
                let dest = spin.join(rel);
                dest.parent()
                    .map(fs::create_dir_all)
                    .unwrap_or(Ok(()))
                    .and_then(|_| fs::write(&dest, &processed.output))
            }
        };
        if written.is_err() {
            eprintln!("coan: {file}: error 0x00805: Cannot write output");
            code |= ERROR_BIT;
        }
    }
    let _ = stdout.flush();
    finish(code, false, Some((files.len(), done, errors)));
}
