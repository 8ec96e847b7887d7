//! Model definitions
//!
//! Resource nodes, declarations and certificate handles shared by the
//! builder and the executor.

mod certificate;
mod declaration;
mod kind;
mod node;

// Re-exports
pub use certificate::*;
pub use declaration::*;
pub use kind::*;
pub use node::*;
