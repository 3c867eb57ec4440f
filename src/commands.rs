//! Chat-style commands: `status`, `help`, `notify <N><m|h|d>` and `notify cancel`.
//!
//! Every outcome, including a malformed command, is a plain-text reply for the
//! person who asked. Nothing here is an HTTP error.

use crate::core_modules::occupancy::OccupancyReader;
use crate::notify::{SubscribeOutcome, SubscriberStore, Subscription};
use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::sync::Arc;

pub const HELP_TEXT: &str = "\
Commands
  status          Check if the table is in use
  notify <time>   Notify me when the table becomes free, for the next <time>
                  usage: notify 10m, notify 2h, notify 1d
  notify cancel   Cancel a current notification period
  help            Display command usage instructions";

/// Unit of a `notify` duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "m" => Some(TimeUnit::Minutes),
            "h" => Some(TimeUnit::Hours),
            "d" => Some(TimeUnit::Days),
            _ => None,
        }
    }

    fn suffix(self) -> char {
        match self {
            TimeUnit::Minutes => 'm',
            TimeUnit::Hours => 'h',
            TimeUnit::Days => 'd',
        }
    }

    fn span(self, amount: u32) -> Option<TimeDelta> {
        let amount = i64::from(amount);
        match self {
            TimeUnit::Minutes => TimeDelta::try_minutes(amount),
            TimeUnit::Hours => TimeDelta::try_hours(amount),
            TimeUnit::Days => TimeDelta::try_days(amount),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    Help,
    Notify { amount: u32, unit: TimeUnit },
    NotifyCancel,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Status => f.write_str("status"),
            Command::Help => f.write_str("help"),
            Command::Notify { amount, unit } => write!(f, "notify {amount}{}", unit.suffix()),
            Command::NotifyCancel => f.write_str("notify cancel"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Empty command. See `help` command for usage")]
    Empty,
    #[error("Command does not exist. See `help` command for usage")]
    Unknown(String),
    #[error("Please use correct command syntax. See `help` command for usage")]
    BadSyntax(String),
}

/// Parses one message. Extra words after a complete command are a syntax error.
pub fn parse(text: &str) -> Result<Command, CommandError> {
    let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    match words.as_slice() {
        [] => Err(CommandError::Empty),
        ["status"] => Ok(Command::Status),
        ["help"] => Ok(Command::Help),
        ["notify", "cancel"] => Ok(Command::NotifyCancel),
        ["notify", period] => parse_period(period).ok_or_else(|| CommandError::BadSyntax(text.trim().to_string())),
        ["status" | "help" | "notify", ..] => Err(CommandError::BadSyntax(text.trim().to_string())),
        [other, ..] => Err(CommandError::Unknown(other.to_string())),
    }
}

fn parse_period(period: &str) -> Option<Command> {
    let split = period.find(|c: char| !c.is_ascii_digit())?;
    let (digits, suffix) = period.split_at(split);
    let amount: u32 = digits.parse().ok()?;
    let unit = TimeUnit::from_suffix(suffix)?;
    (amount > 0).then_some(Command::Notify { amount, unit })
}

/// Answers commands against the live occupancy and the subscriber store.
#[derive(Clone)]
pub struct CommandHandler {
    occupancy: OccupancyReader,
    subscribers: Arc<SubscriberStore>,
}

impl CommandHandler {
    pub fn new(occupancy: OccupancyReader, subscribers: Arc<SubscriberStore>) -> Self {
        Self {
            occupancy,
            subscribers,
        }
    }

    pub fn handle(&self, user: &str, name: &str, text: &str) -> String {
        self.handle_at(user, name, text, Utc::now())
    }

    pub fn handle_at(&self, user: &str, name: &str, text: &str, now: DateTime<Utc>) -> String {
        let command = match parse(text) {
            Ok(command) => command,
            Err(error) => {
                tracing::info!(user, text, error = %error, "Rejected command");
                return error.to_string();
            }
        };

        let reply = match command {
            Command::Status => {
                if self.occupancy.occupancy().in_use {
                    "The pool table is currently in use".to_string()
                } else {
                    "The pool table is currently free".to_string()
                }
            }
            Command::Help => HELP_TEXT.to_string(),
            Command::NotifyCancel => match self.subscribers.cancel(user) {
                Some(_) => "Successfully canceled your notifications".to_string(),
                None => "You have no current request for notifications".to_string(),
            },
            Command::Notify { amount, unit } => {
                let Some(expires_at) = unit.span(amount).and_then(|span| now.checked_add_signed(span)) else {
                    return CommandError::BadSyntax(text.trim().to_string()).to_string();
                };
                let outcome = self.subscribers.subscribe(Subscription {
                    id: user.to_string(),
                    name: name.to_string(),
                    expires_at,
                });
                let period = format!("{amount}{}", unit.suffix());
                match outcome {
                    SubscribeOutcome::Created => {
                        format!("You will now receive table status notifications for the next {period}")
                    }
                    SubscribeOutcome::Replaced => format!(
                        "Old notification request overwritten. You will now receive table status notifications for the next {period}"
                    ),
                }
            }
        };

        tracing::info!(user, name, command = %command, "Handled command");
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::census::CensusSnapshot;
    use crate::core_modules::occupancy::OccupancyTracker;

    #[test]
    fn notify_periods_parse() {
        assert_eq!(
            parse("notify 10m"),
            Ok(Command::Notify {
                amount: 10,
                unit: TimeUnit::Minutes
            })
        );
        assert_eq!(
            parse("notify 2h"),
            Ok(Command::Notify {
                amount: 2,
                unit: TimeUnit::Hours
            })
        );
        assert_eq!(
            parse("  NOTIFY 1d "),
            Ok(Command::Notify {
                amount: 1,
                unit: TimeUnit::Days
            })
        );
        assert_eq!(parse("notify cancel"), Ok(Command::NotifyCancel));
        assert_eq!(parse("status"), Ok(Command::Status));
        assert_eq!(parse("help"), Ok(Command::Help));
    }

    #[test]
    fn malformed_commands_are_rejected() {
        assert!(matches!(parse("notify"), Err(CommandError::BadSyntax(_))));
        assert!(matches!(parse("notify 10w"), Err(CommandError::BadSyntax(_))));
        assert!(matches!(parse("notify m"), Err(CommandError::BadSyntax(_))));
        assert!(matches!(parse("notify 10"), Err(CommandError::BadSyntax(_))));
        assert!(matches!(parse("notify 0m"), Err(CommandError::BadSyntax(_))));
        assert!(matches!(parse("notify 5mm"), Err(CommandError::BadSyntax(_))));
        assert!(matches!(parse("status now"), Err(CommandError::BadSyntax(_))));
        assert_eq!(parse("dance"), Err(CommandError::Unknown("dance".to_string())));
        assert_eq!(parse("   "), Err(CommandError::Empty));
    }

    fn handler() -> (OccupancyTracker, CommandHandler, Arc<SubscriberStore>) {
        let tracker = OccupancyTracker::new();
        let store = Arc::new(SubscriberStore::new());
        let handler = CommandHandler::new(tracker.reader(), Arc::clone(&store));
        (tracker, handler, store)
    }

    #[test]
    fn status_follows_occupancy() {
        let (mut tracker, handler, _) = handler();
        assert_eq!(handler.handle("u1", "Ann", "status"), "The pool table is currently free");
        tracker.ingest(CensusSnapshot::new(1, 0, 0, 0));
        assert_eq!(handler.handle("u1", "Ann", "status"), "The pool table is currently in use");
    }

    #[test]
    fn notify_subscribes_and_overwrites() {
        let (_tracker, handler, store) = handler();
        let now = Utc::now();

        let first = handler.handle_at("u1", "Ann", "notify 10m", now);
        assert_eq!(first, "You will now receive table status notifications for the next 10m");
        assert_eq!(store.get("u1").unwrap().expires_at, now + TimeDelta::minutes(10));

        let second = handler.handle_at("u1", "Ann", "notify 2h", now);
        assert!(second.starts_with("Old notification request overwritten"));
        assert_eq!(store.get("u1").unwrap().expires_at, now + TimeDelta::hours(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn cancel_reports_whether_anything_was_removed() {
        let (_tracker, handler, store) = handler();
        assert_eq!(
            handler.handle("u1", "Ann", "notify cancel"),
            "You have no current request for notifications"
        );
        handler.handle("u1", "Ann", "notify 1d");
        assert_eq!(handler.handle("u1", "Ann", "notify cancel"), "Successfully canceled your notifications");
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_commands_get_an_error_reply() {
        let (_tracker, handler, _) = handler();
        assert!(handler.handle("u1", "Ann", "exit").starts_with("Command does not exist"));
        assert!(handler.handle("u1", "Ann", "help").contains("notify cancel"));
    }
}
