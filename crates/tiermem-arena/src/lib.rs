//! Growable backing arena and fixed-size slab pool (spec components A, B).
//!
//! These two types back every other table in the tree: the radix trie's
//! node pool and the registry's type/block metadata tables are each a
//! [`Slab`] over its own [`Arena`].

mod arena;
mod slab;

pub use arena::Arena;
pub use slab::Slab;
