use std::fmt;

/// Kind of change carried by an update, notification or work order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateType {
    Added,
    Changed,
    Removed,
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UpdateType::Added => "added",
            UpdateType::Changed => "changed",
            UpdateType::Removed => "removed",
        };
        f.write_str(text)
    }
}
