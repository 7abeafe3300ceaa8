//! Argument validators.
//!
//! Each validator turns a raw string into a typed value or a
//! [`ValidationError`] carrying the violated constraint.

use std::num::IntErrorKind;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Bound, ValidationError};

/// Crate rarities accepted by [`crate_rarity`].
pub const CRATE_RARITIES: &[&str] = &["common", "uncommon", "rare", "magic", "legendary"];

/// Coin sides accepted by [`coin_side`].
pub const COIN_SIDES: &[&str] = &["heads", "tails"];

const CRATE_RARITY_KIND: &str = "crate rarity";
const COIN_SIDE_KIND: &str = "coin side";

/// Component above which a date part is taken to be the year.
const YEAR_THRESHOLD: i64 = 1900;

const INT_PARSE_FAILED: &str = "Converting to int failed.";

/// A configured argument validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Validator {
    /// Integer within `min..=max`.
    Range {
        /// Smallest accepted value
        min: i64,
        /// Largest accepted value
        max: i64,
    },
    /// Integer strictly greater than `min`.
    GreaterThan {
        /// Exclusive lower bound
        min: i64,
    },
    /// Case-insensitive member of `allowed`. `kind` names the set in errors.
    Choice {
        /// Name of the set, e.g. `coin side`
        kind: String,
        /// Lower-cased accepted values
        allowed: Vec<String>,
    },
    /// Calendar date between `min` and today, inclusive.
    Date {
        /// Earliest accepted date
        min: NaiveDate,
    },
}

/// A validated argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validated {
    /// From `Range` or `GreaterThan`
    Int(i64),
    /// Lower-cased choice
    Choice(String),
    /// From `Date`
    Date(NaiveDate),
}

impl Validated {
    /// The integer, if this came from an integer validator.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The lower-cased choice, if any.
    #[must_use]
    pub fn as_choice(&self) -> Option<&str> {
        match self {
            Self::Choice(s) => Some(s),
            _ => None,
        }
    }

    /// The date, if any.
    #[must_use]
    pub const fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl Validator {
    /// A choice validator over a fixed list.
    #[must_use]
    pub fn choice<S: AsRef<str>>(kind: impl Into<String>, allowed: &[S]) -> Self {
        Self::Choice {
            kind: kind.into(),
            allowed: allowed.iter().map(|s| s.as_ref().to_lowercase()).collect(),
        }
    }

    /// The crate rarity preset.
    #[must_use]
    pub fn crate_rarity() -> Self {
        Self::choice(CRATE_RARITY_KIND, CRATE_RARITIES)
    }

    /// The coin side preset.
    #[must_use]
    pub fn coin_side() -> Self {
        Self::choice(COIN_SIDE_KIND, COIN_SIDES)
    }

    /// Validates `input` against today's UTC date.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] describing the violated constraint.
    pub fn validate(&self, input: &str) -> Result<Validated, ValidationError> {
        self.validate_at(input, Utc::now().date_naive())
    }

    /// Validates `input`, treating `today` as the current date.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] describing the violated constraint.
    pub fn validate_at(&self, input: &str, today: NaiveDate) -> Result<Validated, ValidationError> {
        match self {
            Self::Range { min, max } => check_range(input, *min, *max).map(Validated::Int),
            Self::GreaterThan { min } => check_greater_than(input, *min).map(Validated::Int),
            Self::Choice { kind, allowed } => {
                check_choice(input, kind, allowed.as_slice()).map(Validated::Choice)
            }
            Self::Date { min } => check_date(input, *min, today).map(Validated::Date),
        }
    }
}

/// Integer within `min..=max`.
///
/// # Errors
///
/// `BadArgument` if `input` is not an integer, `NotInRange` if it is
/// outside the bounds.
pub fn int_from_to(input: &str, min: i64, max: i64) -> Result<i64, ValidationError> {
    check_range(input, min, max)
}

/// Integer strictly greater than `min`.
///
/// # Errors
///
/// `BadArgument` if `input` is not an integer, `NotInRange` otherwise.
/// Integers above `i64::MAX` saturate to it.
pub fn int_greater_than(input: &str, min: i64) -> Result<i64, ValidationError> {
    check_greater_than(input, min)
}

/// Lower-cased crate rarity.
///
/// # Errors
///
/// `InvalidEnumChoice` with kind `crate rarity`.
pub fn crate_rarity(input: &str) -> Result<String, ValidationError> {
    check_choice(input, CRATE_RARITY_KIND, CRATE_RARITIES)
}

/// Lower-cased coin side.
///
/// # Errors
///
/// `InvalidEnumChoice` with kind `coin side`.
pub fn coin_side(input: &str) -> Result<String, ValidationError> {
    check_choice(input, COIN_SIDE_KIND, COIN_SIDES)
}

/// A date between `min` and today; empty input means today.
///
/// # Errors
///
/// `BadArgument` for unparseable or impossible dates, `DateOutOfRange`
/// for dates before `min` or in the future.
pub fn date_or_today(input: &str, min: NaiveDate) -> Result<NaiveDate, ValidationError> {
    check_date(input, min, Utc::now().date_naive())
}

enum ParsedInt {
    Value(i64),
    /// Syntactically an integer, but beyond `i64` in this direction.
    TooLarge,
    TooSmall,
}

fn parse_int(input: &str) -> Result<ParsedInt, ValidationError> {
    match input.trim().parse::<i64>() {
        Ok(v) => Ok(ParsedInt::Value(v)),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(ParsedInt::TooLarge),
            IntErrorKind::NegOverflow => Ok(ParsedInt::TooSmall),
            _ => Err(ValidationError::bad_argument(INT_PARSE_FAILED)),
        },
    }
}

fn check_range(input: &str, min: i64, max: i64) -> Result<i64, ValidationError> {
    let out_of_range = || ValidationError::NotInRange {
        text: format!("The supplied number must be in range of {min} to {max}."),
        from: min,
        to: Bound::Inclusive(max),
    };
    match parse_int(input)? {
        ParsedInt::Value(v) if (min..=max).contains(&v) => Ok(v),
        _ => Err(out_of_range()),
    }
}

fn check_greater_than(input: &str, min: i64) -> Result<i64, ValidationError> {
    let out_of_range = || ValidationError::NotInRange {
        text: format!("The supplied number must be greater than {min}."),
        from: min.saturating_add(1),
        to: Bound::Unbounded,
    };
    match parse_int(input)? {
        ParsedInt::Value(v) if v > min => Ok(v),
        // No upper bound: saturate rather than reject.
        ParsedInt::TooLarge if min < i64::MAX => Ok(i64::MAX),
        _ => Err(out_of_range()),
    }
}

fn check_choice<S: AsRef<str>>(input: &str, kind: &str, allowed: &[S]) -> Result<String, ValidationError> {
    let lowered = input.to_lowercase();
    if allowed.iter().any(|a| a.as_ref() == lowered) {
        Ok(lowered)
    } else {
        Err(ValidationError::InvalidEnumChoice {
            kind: kind.to_string(),
        })
    }
}

fn check_date(input: &str, min: NaiveDate, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(today);
    }

    let separator = if input.contains('-') {
        '-'
    } else if input.contains('.') {
        '.'
    } else {
        return Err(ValidationError::bad_argument("Invalid date."));
    };

    let parts = input
        .split(separator)
        .map(|p| p.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ValidationError::bad_argument("Invalid date."))?;
    let &[c0, c1, c2] = parts.as_slice() else {
        return Err(ValidationError::bad_argument(
            "A date needs a day, a month and a year.",
        ));
    };

    let (year, month, day) = if c0 > YEAR_THRESHOLD {
        (c0, c1, c2)
    } else if c2 > YEAR_THRESHOLD {
        (c2, c1, c0)
    } else {
        return Err(ValidationError::bad_argument(
            "Use YYYY-MM-DD or DD-MM-YYYY.",
        ));
    };

    let date = calendar_date(year, month, day)
        .ok_or_else(|| ValidationError::bad_argument("That date does not exist."))?;

    if date < min || date > today {
        return Err(ValidationError::DateOutOfRange { min });
    }
    Ok(date)
}

fn calendar_date(year: i64, month: i64, day: i64) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        i32::try_from(year).ok()?,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
    )
}
