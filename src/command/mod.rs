// Command module - THE VOCABULARY
// The closed set of tokens the rover firmware understands

mod vocabulary;

pub use vocabulary::{Command, CommandCategory, CommandError};
