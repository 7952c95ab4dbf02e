use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid table definition: {0}")]
    Definition(#[from] serde_json::Error),

    #[error("invalid index \"{0}\" (expected <column>[=<name>])")]
    IndexSpec(String),

    #[error(transparent)]
    Core(#[from] colstore_core::Error),
}
