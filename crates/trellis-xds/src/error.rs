/// A `Result` alias where the `Err` case is `trellis_xds::Error`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("duplicate cluster registration: {0}")]
    DuplicateCluster(String),

    #[error("service cluster {0:?} has no services")]
    EmptyServiceCluster(String),

    #[error("service cluster has an empty name")]
    UnnamedServiceCluster,
}
