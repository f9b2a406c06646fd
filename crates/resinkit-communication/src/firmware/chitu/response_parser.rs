//! Chitu Response Parser
//!
//! Chitu boards answer in a dialect that only loosely resembles Marlin.
//! This module normalizes raw response lines into the canonical text the
//! rest of the host expects, and extracts the structured facts (byte
//! progress, Z height, firmware version) the printer state is built from.
//!
//! Normalization is an ordered list of rewrite rules; the first rule whose
//! trigger matches is applied and the rest are skipped. Lines no rule
//! matches pass through trimmed and filtered.

use super::commands::{command_word, REPORT_POSITION, STORAGE_STATUS};
use parking_lot::Mutex;
use regex::Regex;
use resinkit_core::FirmwareError;
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

/// Unsigned or signed decimal, as the firmware prints numbers
const FLOAT: &str = r"[-+]?[0-9]*\.?[0-9]+";

/// Canonical text of a busy response
pub const BUSY_RESPONSE: &str = "echo:busy processing";

const VENDOR_IDENTIFIERS: [&str; 2] = ["CBD", "ZWLF"];

/// Which rewrite rule normalized a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewriteKind {
    /// `wait...` busy indicator
    Busy,
    /// `CBD make it` / `ZWLF make it` identifier
    VendorIdentifier,
    /// `C: X:` position report
    PositionReport,
    /// Reply to the progress poll command
    ProgressPoll,
    /// `ok V...` start acknowledgement
    StartAck,
}

impl fmt::Display for RewriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Busy => "busy",
            Self::VendorIdentifier => "vendor identifier",
            Self::PositionReport => "position report",
            Self::ProgressPoll => "progress poll",
            Self::StartAck => "start acknowledgement",
        };
        f.write_str(label)
    }
}

/// Byte progress reported by the progress poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressReport {
    /// Bytes processed
    pub current: u64,
    /// Job size in bytes
    pub total: u64,
    /// Pause flag reported by the board
    pub paused: bool,
}

/// Reply to the storage status query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdStatus {
    /// `SD printing byte N/M`
    Printing { current: u64, total: u64 },
    /// `Not SD printing`
    NotPrinting,
}

/// Structured fact extracted from a response
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseUpdate {
    /// Byte progress from the progress poll
    Progress(ProgressReport),
    /// Storage status from `M27`
    StorageStatus(SdStatus),
    /// Z height
    Position { z: f64 },
    /// Version announced in a start acknowledgement
    FirmwareVersion(String),
}

/// Result of normalizing one response line
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedResponse {
    /// Normalized text
    pub text: String,
    /// Facts to apply to the printer state
    pub updates: Vec<ResponseUpdate>,
    /// Rule that rewrote the line, if any
    pub rewrite: Option<RewriteKind>,
}

struct RewriteContext<'a> {
    line: &'a str,
    command: &'a str,
    firmware_version: &'a str,
    progress_poll_command: &'a str,
}

struct Rewrite {
    text: String,
    updates: Vec<ResponseUpdate>,
}

impl Rewrite {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            updates: Vec::new(),
        }
    }
}

struct RewriteRule {
    kind: RewriteKind,
    applies: fn(&RewriteContext<'_>) -> bool,
    rewrite: fn(&RewriteContext<'_>) -> Rewrite,
}

const REWRITE_RULES: &[RewriteRule] = &[
    RewriteRule {
        kind: RewriteKind::Busy,
        applies: |ctx| ctx.line.starts_with("wait"),
        rewrite: |_| Rewrite::text(BUSY_RESPONSE),
    },
    RewriteRule {
        kind: RewriteKind::VendorIdentifier,
        applies: |ctx| {
            VENDOR_IDENTIFIERS
                .iter()
                .any(|vendor| ctx.line.contains(&format!("{} make it", vendor)))
        },
        rewrite: rewrite_vendor_identifier,
    },
    RewriteRule {
        kind: RewriteKind::PositionReport,
        applies: |ctx| ctx.line.contains("C: X:"),
        rewrite: rewrite_position_report,
    },
    RewriteRule {
        kind: RewriteKind::ProgressPoll,
        applies: |ctx| {
            ctx.command
                .trim()
                .eq_ignore_ascii_case(ctx.progress_poll_command.trim())
        },
        rewrite: rewrite_progress_poll,
    },
    RewriteRule {
        kind: RewriteKind::StartAck,
        applies: |ctx| ctx.line.starts_with("ok V"),
        rewrite: rewrite_start_ack,
    },
];

fn rewrite_vendor_identifier(ctx: &RewriteContext<'_>) -> Rewrite {
    let text = VENDOR_IDENTIFIERS.iter().fold(ctx.line.to_string(), |text, vendor| {
        text.replace(
            &format!("{} make it", vendor),
            &format!(
                "FIRMWARE_NAME:{} made it PROTOCOL_VERSION:{}",
                vendor, ctx.firmware_version
            ),
        )
    });
    Rewrite::text(text)
}

fn rewrite_position_report(ctx: &RewriteContext<'_>) -> Rewrite {
    let text = ctx.line.replace("C: ", "").trim().to_string();
    let updates = parse_z(&text)
        .map(|z| ResponseUpdate::Position { z })
        .into_iter()
        .collect();
    Rewrite { text, updates }
}

fn rewrite_progress_poll(ctx: &RewriteContext<'_>) -> Rewrite {
    let mut updates = Vec::new();
    if let Some(z) = parse_z(ctx.line) {
        updates.push(ResponseUpdate::Position { z });
    }

    let progress = parse_progress(ctx.line).unwrap_or_else(|e| {
        tracing::debug!("Ignoring progress report '{}': {}", ctx.line, e);
        None
    });

    if let Some(report) = progress.filter(|report| report.total > 0) {
        updates.push(ResponseUpdate::Progress(report));
        return Rewrite {
            text: format!("SD printing byte {}/{}", report.current, report.total),
            updates,
        };
    }

    if let Some((actual, target)) = parse_temperature(ctx.line) {
        return Rewrite {
            text: format!("T:0 /0 B:{} /{}", actual, target),
            updates,
        };
    }

    Rewrite {
        text: ctx.line.to_string(),
        updates,
    }
}

fn rewrite_start_ack(ctx: &RewriteContext<'_>) -> Rewrite {
    // "ok V..." is ASCII, so byte 3 is a char boundary.
    let announced = &ctx.line[3..];
    let updates = announced
        .split_whitespace()
        .next()
        .map(|version| ResponseUpdate::FirmwareVersion(version.to_string()))
        .into_iter()
        .collect();
    Rewrite {
        text: format!("ok start {}", announced),
        updates,
    }
}

/// Normalizes Chitu responses
///
/// Shared by every command exchange; the only mutable state is the set of
/// rewrite kinds that were already announced in the log.
pub struct ChituResponseParser {
    progress_poll_command: String,
    announced: Mutex<HashSet<RewriteKind>>,
}

impl ChituResponseParser {
    /// Create a parser for the given progress poll command (usually `M4000`)
    pub fn new(progress_poll_command: impl Into<String>) -> Self {
        Self {
            progress_poll_command: progress_poll_command.into(),
            announced: Mutex::new(HashSet::new()),
        }
    }

    /// Command whose reply carries byte progress
    pub fn progress_poll_command(&self) -> &str {
        &self.progress_poll_command
    }

    /// Normalize one raw response to `command`
    ///
    /// `firmware_version` is substituted into vendor identifier rewrites.
    /// Never fails: numbers that cannot be parsed simply produce no update.
    pub fn process(&self, raw: &str, command: &str, firmware_version: &str) -> ParsedResponse {
        let filtered = strip_noise(raw);
        if filtered.len() != raw.len() {
            tracing::debug!("Filtered non-printable bytes from response to {}", command);
        }

        let line = filtered.trim();
        if line.is_empty() {
            return ParsedResponse::default();
        }

        let ctx = RewriteContext {
            line,
            command,
            firmware_version,
            progress_poll_command: &self.progress_poll_command,
        };

        if let Some(rule) = REWRITE_RULES.iter().find(|rule| (rule.applies)(&ctx)) {
            let Rewrite { text, updates } = (rule.rewrite)(&ctx);
            self.announce(rule.kind, line, &text);
            return ParsedResponse {
                text,
                updates,
                rewrite: Some(rule.kind),
            };
        }

        ParsedResponse {
            text: line.to_string(),
            updates: command_updates(line, command),
            rewrite: None,
        }
    }

    /// Whether `kind` has already been logged at INFO
    pub(crate) fn was_announced(&self, kind: RewriteKind) -> bool {
        self.announced.lock().contains(&kind)
    }

    fn announce(&self, kind: RewriteKind, original: &str, rewritten: &str) {
        if original == rewritten {
            return;
        }
        if self.announced.lock().insert(kind) {
            tracing::info!("Rewrote {} response '{}' -> '{}'", kind, original, rewritten);
        } else {
            tracing::debug!("Rewrote {} response '{}' -> '{}'", kind, original, rewritten);
        }
    }
}

/// Facts carried by replies that no rewrite rule touched
fn command_updates(line: &str, command: &str) -> Vec<ResponseUpdate> {
    let word = command_word(command);
    if word.eq_ignore_ascii_case(REPORT_POSITION) {
        parse_z(line)
            .map(|z| ResponseUpdate::Position { z })
            .into_iter()
            .collect()
    } else if word.eq_ignore_ascii_case(STORAGE_STATUS) {
        parse_sd_status(line)
            .map(ResponseUpdate::StorageStatus)
            .into_iter()
            .collect()
    } else {
        Vec::new()
    }
}

/// Drop control characters and bytes outside printable ASCII, keeping
/// line breaks and tabs
pub fn strip_noise(raw: &str) -> String {
    raw.chars()
        .filter(|c| matches!(c, ' '..='~' | '\r' | '\n' | '\t'))
        .collect()
}

fn temperature_regex() -> &'static Regex {
    static TEMPERATURE_REGEX: OnceLock<Regex> = OnceLock::new();
    TEMPERATURE_REGEX.get_or_init(|| {
        Regex::new(&format!(
            r"(?:^|[^A-Za-z])[Bb]:\s*(?P<actual>{f})(?:\s*/?\s*(?P<target>{f}))?",
            f = FLOAT
        ))
        .expect("invalid regex pattern")
    })
}

fn progress_regex() -> &'static Regex {
    static PROGRESS_REGEX: OnceLock<Regex> = OnceLock::new();
    PROGRESS_REGEX.get_or_init(|| {
        Regex::new(&format!(
            r"(?:^|[^A-Za-z])[Dd]z?:?\s*(?P<current>{f})(?:\s*/?\s*(?P<total>{f}))?(?:\s*/?\s*(?P<pause>\d+))?",
            f = FLOAT
        ))
        .expect("invalid regex pattern")
    })
}

fn z_regex() -> &'static Regex {
    static Z_REGEX: OnceLock<Regex> = OnceLock::new();
    Z_REGEX.get_or_init(|| {
        Regex::new(&format!(r"(?:^|[^A-Za-z])[Zz]:(?P<value>{})", FLOAT))
            .expect("invalid regex pattern")
    })
}

fn sd_bytes_regex() -> &'static Regex {
    static SD_BYTES_REGEX: OnceLock<Regex> = OnceLock::new();
    SD_BYTES_REGEX.get_or_init(|| {
        Regex::new(r"(?P<current>[0-9]+)/(?P<total>[0-9]+)").expect("invalid regex pattern")
    })
}

fn parse_byte_count(value: &str) -> Result<u64, FirmwareError> {
    let parsed: f64 = value.parse().map_err(|_| FirmwareError::ResponseParse {
        reason: format!("'{}' is not a number", value),
    })?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(FirmwareError::ResponseParse {
            reason: format!("'{}' is not a byte count", value),
        });
    }
    if parsed >= u64::MAX as f64 {
        return Err(FirmwareError::ResponseParse {
            reason: format!("'{}' is out of range", value),
        });
    }
    Ok(parsed as u64)
}

/// Extract `D current/total/pause` progress
///
/// Returns `Ok(None)` when the line carries no progress field. A missing
/// total reads as zero; a pause flag of `1` marks the job paused.
pub fn parse_progress(line: &str) -> Result<Option<ProgressReport>, FirmwareError> {
    let Some(caps) = progress_regex().captures(line) else {
        return Ok(None);
    };

    let current = parse_byte_count(&caps["current"])?;
    let total = match caps.name("total") {
        Some(m) => parse_byte_count(m.as_str())?,
        None => 0,
    };
    let paused = match caps.name("pause") {
        Some(m) => {
            m.as_str()
                .parse::<u64>()
                .map_err(|_| FirmwareError::ResponseParse {
                    reason: format!("'{}' is not a pause flag", m.as_str()),
                })?
                == 1
        }
        None => false,
    };

    Ok(Some(ProgressReport {
        current,
        total,
        paused,
    }))
}

/// Extract `B:actual/target`; the target defaults to the actual value
pub fn parse_temperature(line: &str) -> Option<(String, String)> {
    let caps = temperature_regex().captures(line)?;
    let actual = caps["actual"].to_string();
    let target = caps
        .name("target")
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| actual.clone());
    Some((actual, target))
}

/// Extract the value of a `Z:` field
pub fn parse_z(line: &str) -> Option<f64> {
    z_regex()
        .captures(line)
        .and_then(|caps| caps["value"].parse().ok())
}

/// Interpret a storage status reply
pub fn parse_sd_status(text: &str) -> Option<SdStatus> {
    if text.contains("SD printing byte") {
        let caps = sd_bytes_regex().captures(text)?;
        Some(SdStatus::Printing {
            current: caps["current"].parse().ok()?,
            total: caps["total"].parse().ok()?,
        })
    } else if text.contains("Not SD printing") {
        Some(SdStatus::NotPrinting)
    } else {
        None
    }
}

/// Extract the `PROTOCOL_VERSION:` value from a firmware info reply
pub fn parse_protocol_version(text: &str) -> Option<String> {
    if !text.contains("FIRMWARE_NAME:") {
        return None;
    }
    let (_, rest) = text.split_once("PROTOCOL_VERSION:")?;
    let version = rest
        .split_whitespace()
        .next()?
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
    (!version.is_empty()).then(|| version.to_string())
}

/// The board acknowledged the command
pub fn is_acknowledged(text: &str) -> bool {
    text.to_ascii_lowercase().contains("ok")
}

/// The board opened the selected file
pub fn is_file_opened(text: &str) -> bool {
    is_acknowledged(text) || text.to_ascii_lowercase().contains("file opened")
}
