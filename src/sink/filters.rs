//! Record filters applied before submission

use crate::types::Message;
use std::fmt;

/// Field holding the record level
pub const DEFAULT_LEVEL_KEY: &str = "level";

/// Decides whether a record is shipped. `false` drops it.
pub trait Filter: Send + Sync {
    /// Return `true` to keep the record
    fn filter(&self, msg: &Message) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&Message) -> bool + Send + Sync,
{
    fn filter(&self, msg: &Message) -> bool {
        self(msg)
    }
}

/// Keeps a record only if every filter keeps it. An empty chain keeps everything.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter
    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Number of filters in the chain
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the chain has no filters
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Filter for FilterChain {
    fn filter(&self, msg: &Message) -> bool {
        self.filters.iter().all(|f| f.filter(msg))
    }
}

/// Severity on the structured-logging scale: DEBUG=-4, INFO=0, WARN=4, ERROR=8
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(pub i32);

impl Level {
    /// TRACE
    pub const TRACE: Level = Level(-8);
    /// DEBUG
    pub const DEBUG: Level = Level(-4);
    /// INFO
    pub const INFO: Level = Level(0);
    /// WARN
    pub const WARN: Level = Level(4);
    /// ERROR
    pub const ERROR: Level = Level(8);

    /// Parse `NAME`, `NAME+n` or `NAME-n`, case-insensitively
    pub fn parse(text: &str) -> Option<Level> {
        let text = text.trim();
        let (name, offset) = match text.find(['+', '-']) {
            Some(i) => (&text[..i], text[i..].parse::<i32>().ok()?),
            None => (text, 0),
        };
        let base = match name.to_ascii_uppercase().as_str() {
            "TRACE" => Level::TRACE,
            "DEBUG" => Level::DEBUG,
            "INFO" => Level::INFO,
            "WARN" | "WARNING" => Level::WARN,
            "ERROR" => Level::ERROR,
            _ => return None,
        };
        Some(Level(base.0.saturating_add(offset)))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, base) = match self.0 {
            i32::MIN..=-8 => ("TRACE", Level::TRACE),
            -7..=-1 => ("DEBUG", Level::DEBUG),
            0..=3 => ("INFO", Level::INFO),
            4..=7 => ("WARN", Level::WARN),
            _ => ("ERROR", Level::ERROR),
        };
        match self.0 - base.0 {
            0 => write!(f, "{}", name),
            offset => write!(f, "{}{:+}", name, offset),
        }
    }
}

/// Drops records below a minimum level. Records without a parsable level are kept.
#[derive(Debug, Clone)]
pub struct LevelFilter {
    /// Field holding the level
    pub level_key: String,
    /// Lowest level that is shipped
    pub min_level: Level,
}

impl LevelFilter {
    /// Filter on the default `level` field
    pub fn new(min_level: Level) -> Self {
        Self {
            level_key: DEFAULT_LEVEL_KEY.to_string(),
            min_level,
        }
    }

    /// Ship INFO and above
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }
}

impl Filter for LevelFilter {
    fn filter(&self, msg: &Message) -> bool {
        match msg.get(&self.level_key).and_then(Level::parse) {
            Some(level) => level >= self.min_level,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogFields;

    fn with_level(level: &str) -> Message {
        Message::now(LogFields::new()).with_field("level", level)
    }

    #[test]
    fn test_chain_requires_all() {
        let msg = Message::now(LogFields::new());
        assert!(FilterChain::new().filter(&msg));
        assert!(FilterChain::new().with(|_: &Message| true).filter(&msg));

        let chain = FilterChain::new()
            .with(|_: &Message| true)
            .with(|_: &Message| false);
        assert_eq!(chain.len(), 2);
        assert!(!chain.filter(&msg));
    }

    #[test]
    fn test_info_level_filter() {
        let filter = LevelFilter::info();
        assert!(!filter.filter(&with_level("DEBUG")));
        assert!(filter.filter(&with_level("INFO")));
        assert!(filter.filter(&with_level("WARN")));
        assert!(filter.filter(&with_level("error")));
        assert!(filter.filter(&Message::now(LogFields::new())));
        assert!(filter.filter(&with_level("verbose")));
    }

    #[test]
    fn test_level_parse_offsets() {
        assert_eq!(Level::parse("INFO+2"), Some(Level(2)));
        assert_eq!(Level::parse("debug-1"), Some(Level(-5)));
        assert_eq!(Level::parse("WARNING"), Some(Level::WARN));
        assert_eq!(Level::parse("INFO+x"), None);
        assert_eq!(Level::parse(""), None);
    }

    #[test]
    fn test_level_display() {
        assert_eq!(Level::INFO.to_string(), "INFO");
        assert_eq!(Level(2).to_string(), "INFO+2");
        assert_eq!(Level(-5).to_string(), "DEBUG-1");
        assert_eq!(Level(-9).to_string(), "TRACE-1");
    }
}
