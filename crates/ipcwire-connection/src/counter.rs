/// First message number handed out by a connection.
pub const FIRST_MESSAGE_NUM: u32 = 1;
/// Last message number before wrapping around.
pub const LAST_MESSAGE_NUM: u32 = i32::MAX as u32;

/// `start` was not below `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid counter range: start {start} must be below limit {limit}")]
pub struct CounterRangeError {
    pub start: u32,
    pub limit: u32,
}

/// Endless counter over `start..=limit` that wraps back to `start`.
#[derive(Debug, Clone)]
pub struct WrappedCounter {
    start: u32,
    limit: u32,
    next: u32,
}

impl WrappedCounter {
    pub fn new(start: u32, limit: u32) -> Result<Self, CounterRangeError> {
        if start >= limit {
            return Err(CounterRangeError { start, limit });
        }
        Ok(Self {
            start,
            limit,
            next: start,
        })
    }

    /// Counter over message numbers, `1..=i32::MAX`.
    pub fn message_nums() -> Self {
        Self {
            start: FIRST_MESSAGE_NUM,
            limit: LAST_MESSAGE_NUM,
            next: FIRST_MESSAGE_NUM,
        }
    }

    /// Return the current value and advance.
    pub fn next_value(&mut self) -> u32 {
        let value = self.next;
        self.next = if value >= self.limit {
            self.start
        } else {
            value + 1
        };
        value
    }
}

impl Iterator for WrappedCounter {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        Some(self.next_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_to_start() {
        let counter = WrappedCounter::new(1, 3).unwrap();
        let seen: Vec<u32> = counter.take(7).collect();
        assert_eq!(seen, [1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn handles_upper_bound_of_u32() {
        let mut counter = WrappedCounter::new(u32::MAX - 1, u32::MAX).unwrap();
        assert_eq!(counter.next_value(), u32::MAX - 1);
        assert_eq!(counter.next_value(), u32::MAX);
        assert_eq!(counter.next_value(), u32::MAX - 1);
    }

    #[test]
    fn message_nums_start_at_one() {
        let mut counter = WrappedCounter::message_nums();
        assert_eq!(counter.next_value(), 1);
        assert_eq!(counter.next_value(), 2);
    }

    #[test]
    fn rejects_empty_range() {
        assert_eq!(
            WrappedCounter::new(3, 3).unwrap_err(),
            CounterRangeError { start: 3, limit: 3 }
        );
        assert!(WrappedCounter::new(5, 1).is_err());
    }
}
