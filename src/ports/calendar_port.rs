//! Trading calendar port trait.

use chrono::NaiveDate;

use crate::domain::error::SamselectError;

pub trait CalendarPort {
    /// Ordered trading sessions of `market` within `[start, end]`.
    fn sessions(
        &self,
        market: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, SamselectError>;

    fn is_trading_day(&self, market: &str, date: NaiveDate) -> bool;
}
