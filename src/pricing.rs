use rust_decimal::Decimal;

use crate::model::{MINUTE_MS, Span};

/// Whole hours billed for a span: elapsed whole minutes divided by 60,
/// rounded up. Any positive span bills at least one hour.
pub fn billable_hours(span: &Span) -> u32 {
    let minutes = span.duration_ms() / MINUTE_MS;
    let hours = (minutes + 59) / 60;
    hours.max(1) as u32
}

/// Flat hourly price with partial hours billed as full hours.
/// Caller guarantees `span.end > span.start`.
pub fn cost(hourly_rate: Decimal, span: &Span) -> Decimal {
    Decimal::from(billable_hours(span)) * hourly_rate
}
