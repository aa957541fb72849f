//! Task prioritization.

use std::cmp::Ordering;

/// Priority level for load tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Low,
            1 => Self::Normal,
            2 => Self::High,
            _ => Self::Critical,
        }
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Item with associated priority for queue ordering. Greater means it runs
/// first: higher priority, then lower sequence.
#[derive(Debug)]
pub struct PrioritizedItem<T> {
    pub priority: Priority,
    pub sequence: u64,
    pub item: T,
}

impl<T> PartialEq for PrioritizedItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<T> Eq for PrioritizedItem<T> {}

impl<T> PartialOrd for PrioritizedItem<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PrioritizedItem<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence), // Lower sequence = earlier
            ord => ord,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(priority: Priority, sequence: u64) -> PrioritizedItem<()> {
        PrioritizedItem {
            priority,
            sequence,
            item: (),
        }
    }

    #[test]
    fn test_priority_from_u8_saturates() {
        assert_eq!(Priority::from(0), Priority::Low);
        assert_eq!(Priority::from(2), Priority::High);
        assert_eq!(Priority::from(200), Priority::Critical);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_higher_priority_wins() {
        assert!(item(Priority::High, 9) > item(Priority::Normal, 0));
    }

    #[test]
    fn test_fifo_within_priority() {
        assert!(item(Priority::Normal, 1) > item(Priority::Normal, 2));
    }
}
