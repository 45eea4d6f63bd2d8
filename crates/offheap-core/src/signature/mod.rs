mod builtin;
mod pattern;
mod scanner;
mod set;

pub use builtin::*;
pub use pattern::*;
pub use scanner::*;
pub use set::*;
