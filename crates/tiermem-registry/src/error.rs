use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry capacity exhausted")]
    Full,
    #[error("address or hash already registered")]
    AlreadyRegistered,
}

impl From<tiermem_critnib::CritnibError> for RegistryError {
    fn from(e: tiermem_critnib::CritnibError) -> Self {
        match e {
            tiermem_critnib::CritnibError::OutOfNodes => RegistryError::Full,
            tiermem_critnib::CritnibError::AlreadyExists => RegistryError::AlreadyRegistered,
        }
    }
}
