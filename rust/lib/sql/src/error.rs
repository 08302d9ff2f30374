use thiserror::Error;

#[derive(Error, Debug)]
pub enum SQLError {
    #[error("query error: {0}")]
    Query(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("transaction error: {0}")]
    Transaction(String),
}

impl SQLError {
    /// Whether the underlying failure was a uniqueness violation.
    pub fn is_unique_violation(&self) -> bool {
        self.to_string().contains("UNIQUE constraint")
    }
}
