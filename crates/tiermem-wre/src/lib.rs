//! Weighted-rank AVL tree (spec component E): a sorted, weight-augmented
//! binary search tree supporting a weighted quantile query.

mod node;
mod wre;

pub use wre::Wre;
