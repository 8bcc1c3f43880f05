use serde::{Deserialize, Serialize};

/// Which way to walk from an anchor date when resolving trading days.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Direction {
    /// Days strictly after the anchor, oldest first.
    #[default]
    Forward,
    /// Days on or before the anchor, returned oldest first.
    Backward,
}
