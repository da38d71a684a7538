//! Piecewise-constant availability traces.

use super::{PlatformError, ResourceKey};

/// One step of a profile: from `date` on, the traced value is `value`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileEvent {
    pub date: f64,
    pub value: f64,
}

/// Time-varying availability of a resource.
///
/// Speed and bandwidth profiles carry scale factors applied to the nominal
/// capacity. State profiles carry `value <= 0` for off and anything else for on.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    events: Vec<ProfileEvent>,
    repeat_period: Option<f64>,
}

impl Profile {
    /// Creates a one-shot profile from `(date, value)` pairs.
    ///
    /// # Errors
    ///
    /// - `PlatformError::InvalidProfile` - Empty, negative, non-finite or decreasing dates
    pub fn new(events: &[(f64, f64)]) -> Result<Self, PlatformError> {
        if events.is_empty() {
            return Err(invalid("a profile needs at least one event"));
        }

        let mut previous = 0.0;
        for &(date, value) in events {
            if !date.is_finite() || !value.is_finite() {
                return Err(invalid("dates and values must be finite"));
            }
            if date < previous {
                return Err(invalid("dates must be non-negative and non-decreasing"));
            }
            previous = date;
        }

        Ok(Self {
            events: events
                .iter()
                .map(|&(date, value)| ProfileEvent { date, value })
                .collect(),
            repeat_period: None,
        })
    }

    /// Creates a profile replayed every `period` seconds.
    ///
    /// # Errors
    ///
    /// - `PlatformError::InvalidProfile` - Invalid events, or `period` not after the last event
    pub fn repeating(events: &[(f64, f64)], period: f64) -> Result<Self, PlatformError> {
        let mut profile = Self::new(events)?;
        let last = profile.events.last().map_or(0.0, |event| event.date);
        if !period.is_finite() || period <= last || period <= 0.0 {
            return Err(invalid("the repeat period must be positive and after the last event"));
        }
        profile.repeat_period = Some(period);
        Ok(profile)
    }

    pub fn events(&self) -> &[ProfileEvent] {
        &self.events
    }

    pub fn repeat_period(&self) -> Option<f64> {
        self.repeat_period
    }

    /// Returns the value in effect at `date`, if any event happened yet.
    pub fn value_at(&self, date: f64) -> Option<f64> {
        let (local, replayed) = match self.repeat_period {
            Some(period) if date >= period => (date % period, true),
            _ => (date, false),
        };
        let current = self
            .events
            .iter()
            .take_while(|event| event.date <= local)
            .last();

        match current {
            Some(event) => Some(event.value),
            // Before the first event of a replayed cycle the previous cycle's
            // last value still holds.
            None if replayed => self.events.last().map(|event| event.value),
            None => None,
        }
    }
}

fn invalid(reason: &str) -> PlatformError {
    PlatformError::InvalidProfile {
        reason: reason.to_string(),
    }
}

/// What a profile event changes on its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProfileAttribute {
    Scale,
    State,
}

/// Replay position of one profile attached to one resource.
#[derive(Debug, Clone)]
pub(crate) struct ProfileCursor {
    pub target: ResourceKey,
    pub attribute: ProfileAttribute,
    profile: Profile,
    index: usize,
    cycle_offset: f64,
}

impl ProfileCursor {
    pub fn new(target: ResourceKey, attribute: ProfileAttribute, profile: Profile) -> Self {
        Self {
            target,
            attribute,
            profile,
            index: 0,
            cycle_offset: 0.0,
        }
    }

    /// Absolute date of the next event, `None` once a one-shot profile is exhausted.
    pub fn next_date(&self) -> Option<f64> {
        self.profile
            .events
            .get(self.index)
            .map(|event| event.date + self.cycle_offset)
    }

    /// Consumes the next event and returns its value.
    pub fn advance(&mut self) -> Option<f64> {
        let value = self.profile.events.get(self.index)?.value;
        self.index += 1;

        if self.index == self.profile.events.len()
            && let Some(period) = self.profile.repeat_period
        {
            self.index = 0;
            self.cycle_offset += period;
        }

        Some(value)
    }
}
