//! Record modifiers applied before submission

use super::filters::DEFAULT_LEVEL_KEY;
use crate::types::Message;

/// Rewrites a record's fields or timestamp
pub trait Modifier: Send + Sync {
    /// Return the rewritten record
    fn modify(&self, msg: Message) -> Message;
}

impl<F> Modifier for F
where
    F: Fn(Message) -> Message + Send + Sync,
{
    fn modify(&self, msg: Message) -> Message {
        self(msg)
    }
}

/// Applies modifiers in order
#[derive(Default)]
pub struct ModifierChain {
    modifiers: Vec<Box<dyn Modifier>>,
}

impl ModifierChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a modifier
    pub fn with(mut self, modifier: impl Modifier + 'static) -> Self {
        self.modifiers.push(Box::new(modifier));
        self
    }
}

impl Modifier for ModifierChain {
    fn modify(&self, msg: Message) -> Message {
        self.modifiers.iter().fold(msg, |msg, m| m.modify(msg))
    }
}

/// Moves a field to a new name
#[derive(Debug, Clone)]
pub struct RenameField {
    /// Existing field name
    pub from: String,
    /// New field name
    pub to: String,
}

impl RenameField {
    /// Rename `from` to `to`
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// `msg` -> `message`
    pub fn message() -> Self {
        Self::new("msg", "message")
    }
}

impl Modifier for RenameField {
    fn modify(&self, msg: Message) -> Message {
        let (timestamp, mut fields) = msg.into_parts();
        if let Some(value) = fields.remove(&self.from) {
            fields.insert(self.to.clone(), value);
        }
        Message::new(timestamp, fields)
    }
}

/// Rewrites the level field through a mapping function
pub struct RemapLevel {
    /// Field holding the level
    pub level_key: String,
    mapper: Box<dyn Fn(&str) -> String + Send + Sync>,
}

impl RemapLevel {
    /// Remap the default `level` field with `mapper`
    pub fn new(mapper: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            level_key: DEFAULT_LEVEL_KEY.to_string(),
            mapper: Box::new(mapper),
        }
    }

    /// Use a different level field
    pub fn with_level_key(mut self, key: impl Into<String>) -> Self {
        self.level_key = key.into();
        self
    }

    /// DEBUG/INFO/WARN/ERROR to syslog severities 7/6/4/3
    pub fn syslog() -> Self {
        Self::new(to_syslog)
    }
}

impl Modifier for RemapLevel {
    fn modify(&self, msg: Message) -> Message {
        let mapped = match msg.get(&self.level_key) {
            Some(level) => (self.mapper)(level),
            None => return msg,
        };
        msg.with_field(self.level_key.clone(), mapped)
    }
}

fn to_syslog(level: &str) -> String {
    match level {
        "DEBUG" => "7",
        "INFO" => "6",
        "WARN" => "4",
        "ERROR" => "3",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogFields;

    #[test]
    fn test_chain_applies_in_order() {
        let mut chain = ModifierChain::new();
        for i in 0..10 {
            chain = chain.with(move |msg: Message| msg.with_field(i.to_string(), i.to_string()));
        }
        let out = chain.modify(Message::now(LogFields::new()));
        for i in 0..10 {
            assert_eq!(out.get(&i.to_string()), Some(i.to_string().as_str()));
        }

        let ordered = ModifierChain::new()
            .with(|msg: Message| msg.with_field("k", "first"))
            .with(|msg: Message| msg.with_field("k", "second"));
        assert_eq!(ordered.modify(Message::now(LogFields::new())).get("k"), Some("second"));
    }

    #[test]
    fn test_rename_message_field() {
        let msg = Message::now(LogFields::new()).with_field("msg", "1");
        let out = RenameField::message().modify(msg);
        assert_eq!(out.get("msg"), None);
        assert_eq!(out.get("message"), Some("1"));

        let untouched = RenameField::message().modify(Message::now(LogFields::new()));
        assert!(untouched.fields().is_empty());
    }

    #[test]
    fn test_remap_level_to_syslog() {
        let remap = RemapLevel::syslog();
        for (level, expected) in [("DEBUG", "7"), ("INFO", "6"), ("WARN", "4"), ("ERROR", "3"), ("unknown", "unknown")] {
            let msg = Message::now(LogFields::new()).with_field("level", level);
            assert_eq!(remap.modify(msg).get("level"), Some(expected));
        }
    }

    #[test]
    fn test_remap_custom_key() {
        let remap = RemapLevel::new(|l: &str| l.to_lowercase()).with_level_key("severity");
        let msg = Message::now(LogFields::new())
            .with_field("severity", "WARN")
            .with_field("level", "WARN");
        let out = remap.modify(msg);
        assert_eq!(out.get("severity"), Some("warn"));
        assert_eq!(out.get("level"), Some("WARN"));
    }
}
