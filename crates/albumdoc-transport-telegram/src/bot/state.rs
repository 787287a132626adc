use serde::{Deserialize, Serialize};

/// Represents the current state of the user dialogue
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum State {
    /// Collecting photos
    #[default]
    Start,
    /// Next text message becomes the output file name
    AwaitingName,
}
