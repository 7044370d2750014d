use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const MAX_SAVED_SLOTS: usize = 5;

/// Identifier of a saved chat, always in `1..=MAX_SAVED_SLOTS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId(u8);

impl SlotId {
    pub fn new(value: u8) -> Result<Self, DomainError> {
        if value == 0 || usize::from(value) > MAX_SAVED_SLOTS {
            return Err(DomainError::SlotNotFound(value));
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    pub(crate) fn all() -> impl Iterator<Item = SlotId> {
        (1..=MAX_SAVED_SLOTS as u8).map(SlotId)
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::SlotId;
    use crate::errors::DomainError;

    #[test]
    fn accepts_one_through_five() {
        for value in 1..=5 {
            assert_eq!(SlotId::new(value).map(|id| id.get()), Ok(value));
        }
    }

    #[test]
    fn rejects_out_of_range_ids() {
        assert_eq!(SlotId::new(0), Err(DomainError::SlotNotFound(0)));
        assert_eq!(SlotId::new(6), Err(DomainError::SlotNotFound(6)));
    }
}
