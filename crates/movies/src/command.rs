// Movie commands

use cmdbus_core::domain::Command;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

pub const RENT_MOVIE: &str = "RentMovie";
pub const BUY_MOVIE: &str = "BuyMovie";

/// Commands of the movie demo
///
/// The serde tag is the command name, which keeps `JsonSerializer` payloads
/// down to the fields (`{"title": "..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload")]
pub enum MovieCommand {
    /// Queued: a worker announces availability later
    RentMovie { title: String },
    /// Handled inline
    BuyMovie { title: String },
}

impl MovieCommand {
    pub fn title(&self) -> &str {
        match self {
            MovieCommand::RentMovie { title } | MovieCommand::BuyMovie { title } => title,
        }
    }
}

impl Command for MovieCommand {
    fn name(&self) -> &str {
        match self {
            MovieCommand::RentMovie { .. } => RENT_MOVIE,
            MovieCommand::BuyMovie { .. } => BUY_MOVIE,
        }
    }

    fn is_queueable(&self) -> bool {
        matches!(self, MovieCommand::RentMovie { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown action '{0}' (expected one of: rent, buy)")]
pub struct UnknownAction(pub String);

/// CLI action keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Rent,
    Buy,
}

impl Action {
    pub fn command(self, title: impl Into<String>) -> MovieCommand {
        let title = title.into();
        match self {
            Action::Rent => MovieCommand::RentMovie { title },
            Action::Buy => MovieCommand::BuyMovie { title },
        }
    }
}

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rent" => Ok(Action::Rent),
            "buy" => Ok(Action::Buy),
            _ => Err(UnknownAction(s.to_string())),
        }
    }
}
