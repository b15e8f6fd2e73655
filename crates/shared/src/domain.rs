use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(WineId);
id_newtype!(ReviewId);

/// Identity provider user id. The hosted auth service hands these out as UUIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewerId(pub Uuid);

impl fmt::Display for ReviewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    pub id: ReviewerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A catalog entry as stored in the `wines` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wine {
    pub id: WineId,
    #[serde(rename = "wine_name")]
    pub name: String,
    pub year: i32,
    pub grape: String,
}

pub const RATING_MIN: f64 = 0.0;
pub const RATING_MAX: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RatingError {
    #[error("rating '{0}' is not a number")]
    NotANumber(String),
    #[error("rating {0} is outside 0..=5")]
    OutOfRange(String),
    #[error("rating {0} has more than one decimal place")]
    TooPrecise(String),
}

/// Review score in `[0, 5]` with one-decimal granularity.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Rating(f64);

impl Rating {
    pub fn new(value: f64) -> Result<Self, RatingError> {
        if !value.is_finite() {
            return Err(RatingError::NotANumber(value.to_string()));
        }
        if !(RATING_MIN..=RATING_MAX).contains(&value) {
            return Err(RatingError::OutOfRange(value.to_string()));
        }
        let tenths = value * 10.0;
        if (tenths - tenths.round()).abs() > 1e-9 {
            return Err(RatingError::TooPrecise(value.to_string()));
        }
        Ok(Self(tenths.round() / 10.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl FromStr for Rating {
    type Err = RatingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let value: f64 = trimmed
            .parse()
            .map_err(|_| RatingError::NotANumber(trimmed.to_string()))?;
        Self::new(value)
    }
}

impl TryFrom<f64> for Rating {
    type Error = RatingError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for f64 {
    fn from(value: Rating) -> Self {
        value.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}
