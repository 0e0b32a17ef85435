use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Configuration could not be loaded or is invalid
    #[display("configuration error")]
    Config,
    /// A storage backend named in the configuration could not be opened
    #[display("could not open {_0} storage")]
    Storage(#[error(not(source))] &'static str),
    /// The HTTP client could not be built
    #[display("could not build HTTP client")]
    Client,
    /// The run could not persist its results
    #[display("sync failed")]
    Sync,
    #[display("reindex failed")]
    Reindex,
}
