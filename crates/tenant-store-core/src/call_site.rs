// crates/tenant-store-core/src/call_site.rs
// ============================================================================
// Module: Call Site Resolution
// Description: Best-effort extraction of the issuing call site from a stack.
// Purpose: Attribute query bursts to application source locations.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`CallSiteResolver::resolve`] scans a captured stack trace top-down, skips
//! frames that belong to this crate, the store driver, the toolchain, or
//! third-party dependencies, and parses the first remaining frame. Three frame
//! shapes are understood:
//!
//! - Rust backtraces: `  4: app::handler` followed by `at src/handler.rs:10:5`
//! - `at function (file:line:col)`
//! - `at file:line:col`
//!
//! If the selected frame carries no parseable location, the result is `None`;
//! the resolver never guesses from a later frame.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Function-path prefixes that never identify application code.
const BUILTIN_FUNCTION_PREFIXES: &[&str] = &[
    "tenant_store_core::",
    "tenant_store_postgres::",
    "std::",
    "core::",
    "alloc::",
    "test::",
    "tokio::",
    "async_trait::",
    "futures::",
    "futures_util::",
    "futures_core::",
    "r2d2::",
    "r2d2_postgres::",
    "postgres::",
    "tokio_postgres::",
    "__rust",
    "rust_begin_unwind",
    "<unknown>",
];

/// Path fragments that mark vendored or toolchain sources.
const BUILTIN_PATH_FRAGMENTS: &[&str] =
    &["/.cargo/registry/", "/.cargo/git/", "/rustc/", "/vendor/", "/node_modules/"];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Application source location that issued an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSite {
    /// Source file path.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// Function name when known.
    pub function: Option<String>,
}

/// Parsed stack frame prior to selection.
#[derive(Debug, Default)]
struct Frame {
    /// Function path when present.
    function: Option<String>,
    /// `(file, line)` when the location parsed.
    location: Option<(String, u32)>,
    /// Raw location text when present but unparseable.
    raw_location: Option<String>,
    /// Frame came from a numbered Rust backtrace line and awaits its `at` line.
    awaiting_location: bool,
}

impl Frame {
    /// Path used for vendored-source checks.
    fn path(&self) -> Option<&str> {
        self.location.as_ref().map(|(file, _)| file.as_str()).or(self.raw_location.as_deref())
    }
}

/// Stateless call-site resolver with configurable skip prefixes.
#[derive(Debug, Clone, Default)]
pub struct CallSiteResolver {
    /// Extra function or path prefixes to skip.
    skip_prefixes: Vec<String>,
}

impl CallSiteResolver {
    /// Creates a resolver that also skips the provided prefixes.
    #[must_use]
    pub fn new(skip_prefixes: Vec<String>) -> Self {
        Self {
            skip_prefixes,
        }
    }

    /// Resolves the first application frame of `stack_trace`.
    #[must_use]
    pub fn resolve(&self, stack_trace: &str) -> Option<CallSite> {
        let frame = parse_frames(stack_trace).into_iter().find(|frame| !self.is_skipped(frame))?;
        let (file, line) = frame.location?;
        Some(CallSite {
            file,
            line,
            function: frame.function,
        })
    }

    /// Returns true when the frame belongs to skipped code.
    fn is_skipped(&self, frame: &Frame) -> bool {
        if let Some(function) = frame.function.as_deref() {
            let function = function.trim_start_matches('<');
            if BUILTIN_FUNCTION_PREFIXES.iter().any(|prefix| function.starts_with(prefix))
                || self.skip_prefixes.iter().any(|prefix| function.starts_with(prefix.as_str()))
            {
                return true;
            }
        }
        if let Some(path) = frame.path() {
            let normalized = path.replace('\\', "/");
            if BUILTIN_PATH_FRAGMENTS.iter().any(|fragment| normalized.contains(fragment))
                || self.skip_prefixes.iter().any(|prefix| normalized.starts_with(prefix.as_str()))
            {
                return true;
            }
        }
        frame.function.is_none() && frame.path().is_none()
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Splits a stack trace into frames.
fn parse_frames(stack_trace: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    let mut rust_style = false;
    for raw_line in stack_trace.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let function = numbered_frame(line).inspect(|_| rust_style = true);
        // Inlined symbols continue a numbered frame without their own index.
        let function = function.or_else(|| (rust_style && !line.starts_with("at ")).then_some(line));
        if let Some(function) = function {
            frames.push(Frame {
                function: Some(strip_symbol_hash(function).to_string()),
                awaiting_location: true,
                ..Frame::default()
            });
            continue;
        }
        let Some(rest) = line.strip_prefix("at ") else {
            continue;
        };
        let rest = rest.trim();
        if let Some(current) = frames.last_mut()
            && current.awaiting_location
        {
            current.awaiting_location = false;
            attach_location(current, rest);
            continue;
        }
        let mut frame = Frame::default();
        if let Some((function, location)) = split_parenthesized(rest) {
            frame.function = Some(function.to_string());
            attach_location(&mut frame, location);
        } else {
            attach_location(&mut frame, rest);
        }
        frames.push(frame);
    }
    frames
}

/// Parses `N: function` backtrace lines.
fn numbered_frame(line: &str) -> Option<&str> {
    let (index, function) = line.split_once(':')?;
    if index.is_empty() || !index.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let function = function.trim();
    (!function.is_empty()).then_some(function)
}

/// Splits `function (location)` into its parts.
fn split_parenthesized(text: &str) -> Option<(&str, &str)> {
    let inner = text.strip_suffix(')')?;
    let open = inner.rfind(" (")?;
    let function = inner[..open].trim();
    let location = &inner[open + 2..];
    (!function.is_empty()).then_some((function, location))
}

/// Records the parsed location on a frame, keeping raw text on failure.
fn attach_location(frame: &mut Frame, text: &str) {
    match parse_location(text) {
        Some(location) => frame.location = Some(location),
        None => frame.raw_location = Some(text.to_string()),
    }
}

/// Parses `file:line:col` (or `file:line`) into `(file, line)`.
fn parse_location(text: &str) -> Option<(String, u32)> {
    let mut parts = text.rsplitn(3, ':');
    let last = parts.next()?;
    let middle = parts.next()?;
    let (file, line) = match parts.next() {
        Some(file) if is_number(middle) && is_number(last) => (file, middle),
        _ if is_number(last) => {
            let (file, _) = text.rsplit_once(':')?;
            (file, last)
        }
        _ => return None,
    };
    let line: u32 = line.parse().ok()?;
    let file = file.trim();
    if line == 0 || file.is_empty() {
        return None;
    }
    Some((file.to_string(), line))
}

/// Returns true for non-empty ASCII digit strings.
fn is_number(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|byte| byte.is_ascii_digit())
}

/// Removes a trailing `::h<16 hex>` symbol hash.
fn strip_symbol_hash(function: &str) -> &str {
    if let Some((path, hash)) = function.rsplit_once("::h")
        && hash.len() == 16
        && hash.bytes().all(|byte| byte.is_ascii_hexdigit())
    {
        return path;
    }
    function
}
