use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Identifies a tab within one connection.  Ids start at 1 and are never reused.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TabId(pub u32);

impl Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab#{}", self.0)
    }
}
