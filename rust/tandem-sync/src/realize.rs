//! The bounded-wait read contract shared by every value-bearing primitive.
//!
//! A realizable primitive holds a value that becomes available at most once:
//! assigned by a producer, computed in the background, or delivered by an
//! external party. Readers on any thread ask for the value with a wait
//! bound; the answer is always a [`Realized`] - either the value itself or
//! one of two reserved sentinels that no producer can forge.

use std::time::Duration;

/// The outcome of reading a realizable primitive.
///
/// The two sentinel variants are distinguishable from every legitimately
/// producible value, including an "absent" value such as `Value(None)` -
/// they are separate enum arms, not magic values inside `T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Realized<T> {
    /// The realized value.
    Value(T),
    /// The producer was canceled before a value won the assignment race.
    Canceled,
    /// No value became available within the wait bound (or, for expiring
    /// primitives, ever).
    TimedOut,
}

impl<T> Realized<T> {
    /// Returns `true` for the `Value` variant.
    pub fn is_value(&self) -> bool {
        matches!(self, Realized::Value(_))
    }

    /// Returns `true` for the `Canceled` sentinel.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Realized::Canceled)
    }

    /// Returns `true` for the `TimedOut` sentinel.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Realized::TimedOut)
    }

    /// Extracts the value, discarding sentinel information.
    pub fn into_value(self) -> Option<T> {
        match self {
            Realized::Value(value) => Some(value),
            Realized::Canceled | Realized::TimedOut => None,
        }
    }
}

/// Blocking reads of an eventually-available value.
///
/// Implementations are multi-reader: any number of threads may wait
/// concurrently and all of them observe the same value once it is
/// available, which is why `T` must be [`Clone`].
pub trait Realize<T: Clone> {
    /// Blocks until the value is available.
    ///
    /// Implementations with an object-wide expiry may return
    /// [`Realized::TimedOut`] once that expiry passes; others block
    /// indefinitely.
    fn wait(&self) -> Realized<T>;

    /// Blocks up to `timeout` for the value.
    ///
    /// If the value is already available this returns it immediately
    /// without blocking. A zero `timeout` is a valid non-blocking poll.
    fn wait_for(&self, timeout: Duration) -> Realized<T>;

    /// Returns `true` when a call to [`wait_for`](Realize::wait_for) would
    /// return without blocking, whatever the outcome.
    fn is_realized(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_distinct_from_absent_value() {
        let absent: Realized<Option<u32>> = Realized::Value(None);
        assert!(absent.is_value());
        assert_ne!(absent, Realized::Canceled);
        assert_ne!(absent, Realized::TimedOut);
        assert_eq!(absent.into_value(), Some(None));
    }

    #[test]
    fn test_into_value_drops_sentinels() {
        assert_eq!(Realized::<u32>::Canceled.into_value(), None);
        assert_eq!(Realized::<u32>::TimedOut.into_value(), None);
        assert_eq!(Realized::Value(3).into_value(), Some(3));
    }
}
