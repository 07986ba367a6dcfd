pub mod command;
mod floats;
pub mod object;
