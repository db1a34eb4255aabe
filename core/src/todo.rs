//! The Todo entity and its value types.
//!
//! A [`Todo`] is the only record kept in the shared collection. Identity and
//! creation time are fixed when the record is created; only `done`, `color`
//! and `deadline` change afterwards, always through a [`TodoPatch`].

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a todo, assigned by the creating client.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(Uuid);

impl TodoId {
    /// Creates a new random `TodoId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `TodoId` from a UUID
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TodoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a string is not one of the palette colors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown palette color: {0}")]
pub struct ParseColorError(String);

/// Color tag from the fixed pastel palette.
///
/// [`Color::None`] is the "no color" sentinel and the default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Color {
    /// No color (white)
    #[default]
    None,
    /// Light pink
    LightPink,
    /// Light green
    LightGreen,
    /// Light blue
    LightBlue,
    /// Light yellow
    LightYellow,
    /// Light peach
    LightPeach,
    /// Light purple
    LightPurple,
    /// Light cyan
    LightCyan,
    /// Light magenta
    LightMagenta,
}

impl Color {
    /// The whole palette in display order, sentinel first.
    pub const ALL: [Self; 9] = [
        Self::None,
        Self::LightPink,
        Self::LightGreen,
        Self::LightBlue,
        Self::LightYellow,
        Self::LightPeach,
        Self::LightPurple,
        Self::LightCyan,
        Self::LightMagenta,
    ];

    /// Hex value stored in the shared collection
    #[must_use]
    pub const fn hex(self) -> &'static str {
        match self {
            Self::None => "#FFFFFF",
            Self::LightPink => "#FFB3BA",
            Self::LightGreen => "#BAFFC9",
            Self::LightBlue => "#BAE1FF",
            Self::LightYellow => "#FFFFBA",
            Self::LightPeach => "#FFDFBA",
            Self::LightPurple => "#E0BBE4",
            Self::LightCyan => "#D4F0F0",
            Self::LightMagenta => "#FFC6FF",
        }
    }

    /// Returns true for the "no color" sentinel
    #[must_use]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hex())
    }
}

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|color| color.hex().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseColorError(s.to_string()))
    }
}

impl TryFrom<String> for Color {
    type Error = ParseColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.hex().to_string()
    }
}

/// Error returned when a deadline is not an ISO `YYYY-MM-DD` date.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid deadline '{input}': expected YYYY-MM-DD")]
pub struct ParseDeadlineError {
    input: String,
}

/// Calendar date a todo is due, without a time component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Deadline(NaiveDate);

impl Deadline {
    /// Wire and input format
    pub const FORMAT: &'static str = "%Y-%m-%d";

    /// Creates a deadline from a date
    #[must_use]
    pub const fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Creates a deadline from year, month and day, if the date exists
    #[must_use]
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Returns the calendar date
    #[must_use]
    pub const fn date(self) -> NaiveDate {
        self.0
    }

    /// Parses form input where an empty field means "no deadline".
    ///
    /// # Errors
    ///
    /// Returns [`ParseDeadlineError`] if the input is non-empty and not a valid date.
    pub fn parse_optional(input: &str) -> Result<Option<Self>, ParseDeadlineError> {
        if input.trim().is_empty() {
            return Ok(None);
        }
        input.parse().map(Some)
    }
}

impl fmt::Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl FromStr for Deadline {
    type Err = ParseDeadlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), Self::FORMAT)
            .map(Self)
            .map_err(|_| ParseDeadlineError {
                input: s.to_string(),
            })
    }
}

impl TryFrom<String> for Deadline {
    type Error = ParseDeadlineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Deadline> for String {
    fn from(deadline: Deadline) -> Self {
        deadline.to_string()
    }
}

/// A single record of the shared collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Unique identifier
    pub id: TodoId,
    /// User-supplied description (may be empty)
    pub text: String,
    /// Completion flag
    pub done: bool,
    /// Creation time in milliseconds since the Unix epoch
    pub created_at: i64,
    /// Palette tag
    #[serde(default)]
    pub color: Color,
    /// Optional due date
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "blank_as_none"
    )]
    pub deadline: Option<Deadline>,
}

impl Todo {
    /// Creates an open todo without color or deadline
    #[must_use]
    pub fn new(id: TodoId, text: impl Into<String>, created_at: i64) -> Self {
        Self {
            id,
            text: text.into(),
            done: false,
            created_at,
            color: Color::None,
            deadline: None,
        }
    }

    /// Sets the color tag
    #[must_use]
    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    /// Sets the deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the completion flag
    #[must_use]
    pub fn with_done(mut self, done: bool) -> Self {
        self.done = done;
        self
    }

    /// Applies an update to the mutable fields
    pub fn apply(&mut self, patch: &TodoPatch) {
        if let Some(done) = patch.done {
            self.done = done;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(deadline) = patch.deadline {
            self.deadline = deadline;
        }
    }
}

/// Change to the mutable fields of a [`Todo`].
///
/// `deadline` is doubly optional: `None` leaves it untouched, `Some(None)`
/// clears it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoPatch {
    /// New completion flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    /// New color tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    /// New deadline, or `Some(None)` to remove it
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_field"
    )]
    pub deadline: Option<Option<Deadline>>,
}

impl TodoPatch {
    /// Patch setting only the completion flag
    #[must_use]
    pub const fn done(done: bool) -> Self {
        Self {
            done: Some(done),
            color: None,
            deadline: None,
        }
    }

    /// Patch setting only the color tag
    #[must_use]
    pub const fn color(color: Color) -> Self {
        Self {
            done: None,
            color: Some(color),
            deadline: None,
        }
    }

    /// Patch setting or clearing the deadline
    #[must_use]
    pub const fn deadline(deadline: Option<Deadline>) -> Self {
        Self {
            done: None,
            color: None,
            deadline: Some(deadline),
        }
    }

    /// Returns true if applying the patch changes nothing
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.done.is_none() && self.color.is_none() && self.deadline.is_none()
    }
}

// A present field (even `null`) deserializes to `Some`, an absent one to `None`.
fn present_field<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

// Records written from an empty date field carry `""`, meaning no deadline.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<Deadline>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(input) => Deadline::parse_optional(&input).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}
