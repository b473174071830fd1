//! Lyrics support for the now-playing view
//!
//! The backend hands out raw LRC text; this module turns it into timed lines
//! and picks the line matching the transport position.

pub mod parser;

pub use parser::{LyricLine, current_line_index, parse};
