use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CritnibError {
    #[error("key already present")]
    AlreadyExists,
    #[error("node pool exhausted")]
    OutOfNodes,
}
