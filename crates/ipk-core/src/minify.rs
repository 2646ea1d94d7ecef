//! Script minification applied while staging.
//!
//! The [`Minifier`] trait is the seam to the minification engine. Two
//! engines ship here:
//!
//! - [`WhitespaceMinifier`]: built in. Drops blank lines, whole-line `//`
//!   comments and indentation, leaving string and template literals alone.
//!   Never renames anything, so reserved identifiers survive trivially.
//!   Emits a line-level Source Map v3.
//! - [`CommandMinifier`]: runs an uglify-js compatible CLI.
//!
//! [`MinifyTransform`] plugs a minifier into [`copy_tree`](crate::io::copy::copy_tree).

use std::path::{Component, Path};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::PackagerConfig;
use crate::error::{IoResultExt, PackagerError, Result};
use crate::io::copy::{CopyContext, FileTransform, Verbatim};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinifyOptions {
    /// Identifiers excluded from name mangling.
    pub reserved: Vec<String>,
    /// Request a companion source map.
    pub source_map: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Minified {
    pub code: String,
    pub source_map: Option<Value>,
}

#[async_trait]
pub trait Minifier: Send + Sync + std::fmt::Debug {
    async fn minify(&self, source: &Path, options: &MinifyOptions) -> Result<Minified>;
}

/// Pick the engine named by the config.
pub fn from_config(config: &PackagerConfig) -> Arc<dyn Minifier> {
    match &config.minifier_command {
        Some(program) => Arc::new(CommandMinifier::new(program.clone())),
        None => Arc::new(WhitespaceMinifier),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceMinifier;

#[async_trait]
impl Minifier for WhitespaceMinifier {
    async fn minify(&self, source: &Path, options: &MinifyOptions) -> Result<Minified> {
        let text = tokio::fs::read_to_string(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                PackagerError::transform(source, "source is not valid UTF-8")
            } else {
                PackagerError::io(source, e)
            }
        })?;
        let source_name = source.to_string_lossy();
        let (code, map) = strip_whitespace(&text, &source_name);
        Ok(Minified {
            code,
            source_map: options.source_map.then_some(map),
        })
    }
}

/// Core of [`WhitespaceMinifier`]: returns the code and its source map.
///
/// Lines that begin inside a string or template literal are emitted
/// untouched, and trailing whitespace is kept on lines that end inside one.
pub fn strip_whitespace(text: &str, source_name: &str) -> (String, Value) {
    let mut code = String::with_capacity(text.len());
    let mut mappings = String::new();
    let (mut prev_line, mut prev_col) = (0i64, 0i64);
    let mut lexer = Lexer::default();
    let mut emitted = false;

    for (line_no, line) in text.lines().enumerate() {
        let starts_in = lexer.mode;
        lexer.scan_line(line);

        let (body, col) = if starts_in.is_literal() {
            (line, 0)
        } else {
            let body = line.trim_start();
            if body.is_empty() || (starts_in == Mode::Code && body.starts_with("//")) {
                continue;
            }
            let body = if lexer.mode.is_literal() {
                body
            } else {
                body.trim_end()
            };
            (body, (line.len() - line.trim_start().len()) as i64)
        };
        let line_no = line_no as i64;

        if emitted {
            code.push('\n');
            mappings.push(';');
        }
        emitted = true;
        code.push_str(body);

        // [generated column, source index, source line, source column]
        encode_vlq(&mut mappings, 0);
        encode_vlq(&mut mappings, 0);
        encode_vlq(&mut mappings, line_no - prev_line);
        encode_vlq(&mut mappings, col - prev_col);
        prev_line = line_no;
        prev_col = col;
    }
    if emitted {
        code.push('\n');
    }

    let map = json!({
        "version": 3,
        "sources": [source_name],
        "names": [],
        "mappings": mappings,
    });
    (code, map)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    Single,
    Double,
    Template,
    BlockComment,
}

impl Mode {
    /// Inside a string or template, where whitespace is content.
    fn is_literal(self) -> bool {
        matches!(self, Self::Single | Self::Double | Self::Template)
    }
}

/// Just enough of a script lexer to know, line by line, whether a line
/// starts or ends inside a literal or a block comment.
#[derive(Debug)]
struct Lexer {
    mode: Mode,
    /// Brace depth of each open `${ ... }` inside a template.
    substitutions: Vec<u32>,
    /// Last significant code character, to tell a regex from a division.
    prev: Option<char>,
}

impl Default for Lexer {
    fn default() -> Self {
        Self {
            mode: Mode::Code,
            substitutions: Vec::new(),
            prev: None,
        }
    }
}

impl Lexer {
    fn scan_line(&mut self, line: &str) {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        let mut escaped = false;

        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();
            match self.mode {
                Mode::Single | Mode::Double => {
                    let quote = if self.mode == Mode::Single { '\'' } else { '"' };
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == quote {
                        self.mode = Mode::Code;
                        self.prev = Some(c);
                    }
                }
                Mode::Template => {
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '`' {
                        self.mode = Mode::Code;
                        self.prev = Some(c);
                    } else if c == '$' && next == Some('{') {
                        self.substitutions.push(0);
                        self.mode = Mode::Code;
                        self.prev = Some('{');
                        i += 1;
                    }
                }
                Mode::BlockComment => {
                    if c == '*' && next == Some('/') {
                        self.mode = Mode::Code;
                        i += 1;
                    }
                }
                Mode::Code => match c {
                    '/' if next == Some('/') => break,
                    '/' if next == Some('*') => {
                        self.mode = Mode::BlockComment;
                        i += 1;
                    }
                    '/' if self.regex_allowed() => {
                        i = skip_regex(&chars, i);
                        self.prev = Some('/');
                    }
                    '\'' => self.mode = Mode::Single,
                    '"' => self.mode = Mode::Double,
                    '`' => self.mode = Mode::Template,
                    '{' => {
                        if let Some(depth) = self.substitutions.last_mut() {
                            *depth += 1;
                        }
                        self.prev = Some(c);
                    }
                    '}' => {
                        match self.substitutions.last_mut() {
                            Some(0) => {
                                self.substitutions.pop();
                                self.mode = Mode::Template;
                            }
                            Some(depth) => *depth -= 1,
                            None => {}
                        }
                        self.prev = Some(c);
                    }
                    c if c.is_whitespace() => {}
                    c => self.prev = Some(c),
                },
            }
            i += 1;
        }

        // A string only continues onto the next line after a trailing backslash.
        if matches!(self.mode, Mode::Single | Mode::Double) && !escaped {
            self.mode = Mode::Code;
        }
    }

    fn regex_allowed(&self) -> bool {
        match self.prev {
            None => true,
            Some(c) => "(,=:[!&|?{};+-*%<>~^".contains(c),
        }
    }
}

/// Index of the closing `/` of the regex literal opening at `start`, or
/// `start` itself when the line holds no closing slash.
fn skip_regex(chars: &[char], start: usize) -> usize {
    let mut in_class = false;
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => return i,
            _ => {}
        }
        i += 1;
    }
    start
}

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Append one Base64 VLQ value (Source Map v3 encoding).
fn encode_vlq(out: &mut String, value: i64) {
    let mut v = if value < 0 {
        (value.unsigned_abs() << 1) | 1
    } else {
        value.unsigned_abs() << 1
    };
    loop {
        let mut digit = (v & 0b1_1111) as usize;
        v >>= 5;
        if v > 0 {
            digit |= 0b10_0000;
        }
        out.push(BASE64[digit] as char);
        if v == 0 {
            break;
        }
    }
}

/// Runs an uglify-js compatible program:
/// `<program> <src> -o <tmp>/out.js --compress --mangle reserved=[..] --source-map`.
#[derive(Debug, Clone)]
pub struct CommandMinifier {
    program: String,
}

impl CommandMinifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn mangle_arg(reserved: &[String]) -> String {
        let quoted: Vec<String> = reserved.iter().map(|r| format!("'{r}'")).collect();
        format!("reserved=[{}]", quoted.join(","))
    }
}

#[async_trait]
impl Minifier for CommandMinifier {
    async fn minify(&self, source: &Path, options: &MinifyOptions) -> Result<Minified> {
        let work = tempfile::Builder::new()
            .prefix("ipk-minify-")
            .tempdir()?;
        let out = work.path().join("out.js");
        let map_path = work.path().join("out.js.map");

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.arg(source)
            .arg("-o")
            .arg(&out)
            .arg("--compress")
            .arg("--mangle")
            .arg(Self::mangle_arg(&options.reserved));
        if options.source_map {
            cmd.arg("--source-map");
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| PackagerError::transform(source, format!("{}: {e}", self.program)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PackagerError::transform(
                source,
                format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            ));
        }

        let code = tokio::fs::read_to_string(&out).await.at(&out)?;
        let code = strip_map_reference(&code);
        let source_map = if options.source_map {
            let text = tokio::fs::read_to_string(&map_path).await.at(&map_path)?;
            let map = serde_json::from_str(&text)
                .map_err(|e| PackagerError::transform(source, format!("bad source map: {e}")))?;
            Some(map)
        } else {
            None
        };

        Ok(Minified { code, source_map })
    }
}

/// Remove a trailing `//# sourceMappingURL=` line; the transform writes its own.
fn strip_map_reference(code: &str) -> String {
    let trimmed = code.trim_end();
    match trimmed.rfind('\n') {
        Some(idx) if trimmed[idx + 1..].starts_with("//# sourceMappingURL=") => {
            format!("{}\n", &trimmed[..idx])
        }
        None if trimmed.starts_with("//# sourceMappingURL=") => String::new(),
        _ => format!("{trimmed}\n"),
    }
}

/// Rewrite a source map's `sources` to be relative to `src_root`.
///
/// Entries outside `src_root` are left as they are.
pub fn rewrite_sources(map: &mut Value, src_root: &Path) {
    let Some(sources) = map.get_mut("sources").and_then(Value::as_array_mut) else {
        return;
    };
    for source in sources.iter_mut() {
        let Some(path) = source.as_str().map(Path::new) else {
            continue;
        };
        if let Ok(rel) = path.strip_prefix(src_root) {
            *source = Value::String(slash_path(rel));
        }
    }
}

fn slash_path(path: &Path) -> String {
    let parts: Vec<_> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    parts.join("/")
}

/// Minifies script sources outside vendored trees; copies everything else verbatim.
#[derive(Debug, Clone)]
pub struct MinifyTransform {
    minifier: Arc<dyn Minifier>,
    options: MinifyOptions,
    config: PackagerConfig,
}

impl MinifyTransform {
    pub fn new(minifier: Arc<dyn Minifier>, config: &PackagerConfig) -> Self {
        Self {
            minifier,
            options: MinifyOptions {
                reserved: config.reserved_identifiers.clone(),
                source_map: true,
            },
            config: config.clone(),
        }
    }

    /// Whether `src` is a script outside any vendored directory.
    pub fn wants(&self, ctx: &CopyContext, src: &Path) -> bool {
        let is_script = src
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.config.is_script_extension(ext));
        if !is_script {
            return false;
        }

        let rel = ctx.relative(src);
        let vendored = rel
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .any(|c| match c {
                Component::Normal(name) => self.config.vendor_dirs.iter().any(|v| name == v.as_str()),
                _ => false,
            });
        !vendored
    }
}

#[async_trait]
impl FileTransform for MinifyTransform {
    async fn apply(&self, ctx: &CopyContext, src: &Path, dst: &Path) -> Result<()> {
        if !self.wants(ctx, src) {
            return Verbatim.apply(ctx, src, dst).await;
        }

        let minified = self.minifier.minify(src, &self.options).await?;
        debug!(file = %ctx.relative(src).display(), role = %ctx.role, "minified");

        let Some(mut map) = minified.source_map else {
            tokio::fs::write(dst, minified.code).await.at(dst)?;
            return Ok(());
        };

        let file_name = dst
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let map_name = format!("{file_name}.map");
        let map_path = dst.with_file_name(&map_name);

        rewrite_sources(&mut map, &ctx.src_root);
        if let Some(obj) = map.as_object_mut() {
            obj.insert("file".to_string(), Value::String(file_name));
        }
        let map_text = serde_json::to_string(&map)
            .map_err(|e| PackagerError::transform(src, format!("bad source map: {e}")))?;

        let mut code = minified.code;
        if !code.is_empty() && !code.ends_with('\n') {
            code.push('\n');
        }
        code.push_str(&format!("//# sourceMappingURL={map_name}\n"));

        // Both outputs must land before this file counts as done.
        tokio::try_join!(
            async { tokio::fs::write(dst, code).await.at(dst) },
            async { tokio::fs::write(&map_path, map_text).await.at(&map_path) },
        )?;
        Ok(())
    }
}
