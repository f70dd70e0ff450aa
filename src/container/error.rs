#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("empty container id: `{0}`")]
    EmptyContainerID(String),
    #[error("container id too long: `{0}`")]
    ContainerIDTooLong(String),
    #[error("invalid character `{character}` in container id `{id}`")]
    InvalidCharacter { id: String, character: char },
}
pub type Result<T> = std::result::Result<T, Error>;
