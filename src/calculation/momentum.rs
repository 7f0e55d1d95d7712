use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::{declare::Direction, error::FetchError, store::Entries};

/// What to do with an instrument after comparing its price to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// No reference yet; the current price becomes the reference.
    Initialize,
    /// Drift reached the threshold.
    Alert { drift: Decimal, direction: Direction },
    /// An alert that the daily throttle held back.
    Throttled { drift: Decimal, direction: Direction },
    /// Drift below the threshold, reference untouched.
    NoOp { drift: Decimal },
}

/// Percentage drift of `current` against `reference`.
///
/// Returns `None` when the reference is zero or the result overflows.
pub fn drift_percent(current: Decimal, reference: Decimal) -> Option<Decimal> {
    current
        .checked_sub(reference)
        .and_then(|delta| delta.checked_div(reference))
        .and_then(|ratio| ratio.checked_mul(dec!(100)))
}

/// Compares the current price with the last reference price.
///
/// `|drift| >= threshold_percent` is an alert, so a move of exactly the
/// threshold fires.
pub fn evaluate(
    short_code: &str,
    current: Decimal,
    reference: Option<Decimal>,
    threshold_percent: Decimal,
) -> Result<Evaluation, FetchError> {
    let reference = match reference {
        None => return Ok(Evaluation::Initialize),
        Some(r) => r,
    };

    if reference.is_zero() {
        return Err(FetchError::ZeroReference {
            short_code: short_code.to_string(),
        });
    }

    let drift = drift_percent(current, reference).ok_or_else(|| FetchError::DriftOverflow {
        short_code: short_code.to_string(),
        current,
        reference,
    })?;

    if drift.abs() < threshold_percent || drift.is_zero() {
        return Ok(Evaluation::NoOp { drift });
    }

    let direction = if drift.is_sign_positive() {
        Direction::Up
    } else {
        Direction::Down
    };

    Ok(Evaluation::Alert { drift, direction })
}

/// Remembers the last alert day per instrument so that at most one alert is
/// sent per instrument and calendar day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyAlertThrottle {
    last_alerts: Entries<NaiveDate>,
}

impl DailyAlertThrottle {
    pub fn new(last_alerts: Entries<NaiveDate>) -> Self {
        DailyAlertThrottle { last_alerts }
    }

    pub fn already_alerted(&self, short_code: &str, day: NaiveDate) -> bool {
        self.last_alerts.get(short_code) == Some(&day)
    }

    /// Lets an alert through once per day. Anything that is not an alert
    /// passes unchanged.
    pub fn admit(&mut self, short_code: &str, day: NaiveDate, evaluation: Evaluation) -> Evaluation {
        match evaluation {
            Evaluation::Alert { drift, direction } if self.already_alerted(short_code, day) => {
                Evaluation::Throttled { drift, direction }
            }
            Evaluation::Alert { .. } => {
                self.last_alerts.insert(short_code.to_string(), day);
                evaluation
            }
            other => other,
        }
    }

    /// Forgets every instrument `keep` rejects.
    pub fn retain(&mut self, keep: impl Fn(&str) -> bool) {
        self.last_alerts.retain(|short_code, _| keep(short_code));
    }

    pub fn entries(&self) -> &Entries<NaiveDate> {
        &self.last_alerts
    }
}
