//! Execution hand-off port trait.
//!
//! The execution collaborator turns target weights into orders and owns
//! fees, slippage, settlement and equity tracking.

use chrono::NaiveDate;

use crate::domain::allocation::AllocationVector;
use crate::domain::error::SamselectError;

pub trait ExecutionPort {
    fn submit(&mut self, date: NaiveDate, weights: &AllocationVector) -> Result<(), SamselectError>;
}
