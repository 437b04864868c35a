//! Syncable entity kinds

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four entity kinds mirrored against the remote CRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Contact,
    /// Sales inquiry, stored remotely as an opportunity.
    Opportunity,
    /// Venue booking, stored remotely as a calendar appointment.
    CalendarEvent,
    Task,
}

impl EntityKind {
    pub const ALL: [Self; 4] = [
        Self::Contact,
        Self::Opportunity,
        Self::CalendarEvent,
        Self::Task,
    ];

    /// Local table holding records of this kind.
    pub const fn table(self) -> &'static str {
        match self {
            Self::Contact => "contacts",
            Self::Opportunity => "opportunities",
            Self::CalendarEvent => "bookings",
            Self::Task => "tasks",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Opportunity => "opportunity",
            Self::CalendarEvent => "calendar_event",
            Self::Task => "task",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contact" | "contacts" => Ok(Self::Contact),
            "opportunity" | "opportunities" | "inquiry" | "inquiries" => Ok(Self::Opportunity),
            "calendar_event" | "event" | "events" | "booking" | "bookings" => {
                Ok(Self::CalendarEvent)
            }
            "task" | "tasks" => Ok(Self::Task),
            other => Err(format!("unknown entity kind '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dashboard_aliases() {
        assert_eq!("inquiry".parse::<EntityKind>(), Ok(EntityKind::Opportunity));
        assert_eq!("Bookings".parse::<EntityKind>(), Ok(EntityKind::CalendarEvent));
        assert!("invoice".parse::<EntityKind>().is_err());
    }

    #[test]
    fn every_kind_has_a_distinct_table() {
        let mut tables = EntityKind::ALL.map(EntityKind::table).to_vec();
        tables.sort_unstable();
        tables.dedup();
        assert_eq!(tables.len(), EntityKind::ALL.len());
    }
}
