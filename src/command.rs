//! Action formatting for the manager wire protocol

use std::fmt;

use crate::{
    constants::{FIELD_ACTION, LINE_TERMINATOR},
    error::{AmiError, AmiResult},
};

/// Fields whose values must never reach the logs.
const REDACTED_FIELDS: &[&str] = &["secret", "key"];

/// Validate that a user-provided string contains no newline characters.
///
/// Manager actions are line-delimited; embedded newlines would allow injection
/// of arbitrary fields or whole actions.
fn validate_no_newlines(s: &str, context: &str) -> AmiResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(AmiError::invalid_field(format!(
            "{} must not contain newlines",
            context
        )));
    }
    Ok(())
}

/// A manager action: the `Action` line plus ordered parameter fields.
///
/// ```
/// use asterisk_ami_tokio::Action;
///
/// let action = Action::new("Originate").unwrap()
///     .field("Channel", "SIP/100").unwrap()
///     .field("Exten", "200").unwrap();
/// assert_eq!(
///     action.to_wire_format(),
///     "Action: Originate\r\nChannel: SIP/100\r\nExten: 200\r\n\r\n"
/// );
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Action {
    name: String,
    fields: Vec<(String, String)>,
}

impl Action {
    /// Start an action with the given name.
    pub fn new(name: &str) -> AmiResult<Self> {
        validate_no_newlines(name, "action name")?;
        Ok(Self {
            name: name.to_string(),
            fields: Vec::new(),
        })
    }

    /// Action with a fixed, known-good name.
    pub(crate) fn fixed(name: &'static str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    /// Build an action from a name and a parameter list, in order.
    pub fn with_fields<I, K, V>(name: &str, fields: I) -> AmiResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        fields
            .into_iter()
            .try_fold(Self::new(name)?, |action, (k, v)| {
                action.field(k.as_ref(), v.as_ref())
            })
    }

    /// Append a parameter field.
    ///
    /// Returns an error if the name or value contains newline characters,
    /// or if the name contains a colon.
    pub fn field(mut self, name: &str, value: &str) -> AmiResult<Self> {
        validate_no_newlines(name, "field name")?;
        validate_no_newlines(value, "field value")?;
        if name.contains(':') {
            return Err(AmiError::invalid_field(format!(
                "field name '{}' must not contain ':'",
                name
            )));
        }
        self.fields
            .push((name.to_string(), value.to_string()));
        Ok(self)
    }

    /// Append a field only when a value is present.
    pub fn optional_field(self, name: &str, value: Option<&str>) -> AmiResult<Self> {
        match value {
            Some(v) => self.field(name, v),
            None => Ok(self),
        }
    }

    /// Action name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter fields in the order they will be written.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Serialize to the CRLF-framed block written to the socket.
    pub fn to_wire_format(&self) -> String {
        use std::fmt::Write;
        let mut result = String::new();
        let _ = write!(result, "{}: {}{}", FIELD_ACTION, self.name, LINE_TERMINATOR);
        for (key, value) in &self.fields {
            let _ = write!(result, "{}: {}{}", key, value, LINE_TERMINATOR);
        }
        result.push_str(LINE_TERMINATOR);
        result
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_map();
        list.entry(&FIELD_ACTION, &self.name);
        for (key, value) in &self.fields {
            if REDACTED_FIELDS.contains(&key.to_ascii_lowercase().as_str()) {
                list.entry(key, &"[REDACTED]");
            } else {
                list.entry(key, value);
            }
        }
        list.finish()
    }
}
