// Error taxonomy for the registry core.
//
// NotFound and the invalid-state variants are expected outcomes of
// occupancy transitions; Store wraps anything SQLite reports.

/// Library-wide result alias.
pub type Result<T> = std::result::Result<T, CareError>;

#[derive(thiserror::Error, Debug)]
pub enum CareError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("bed {bed_id} is not vacant (status: {status})")]
    BedNotVacant { bed_id: i64, status: String },

    #[error("resident {resident_id} already occupies bed {bed_id}")]
    ResidentAlreadyAssigned { resident_id: i64, bed_id: i64 },

    #[error("resident {resident_id} is still referenced by {table}")]
    ResidentReferenced { resident_id: i64, table: &'static str },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CareError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        CareError::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CareError::NotFound { .. })
    }

    /// The referenced records exist but are in the wrong state for the transition.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            CareError::BedNotVacant { .. }
                | CareError::ResidentAlreadyAssigned { .. }
                | CareError::ResidentReferenced { .. }
        )
    }

    /// The input itself was refused: a bad value, or a row that breaks a
    /// schema constraint (unknown resident id, duplicate bed number, ...).
    pub fn is_rejected_input(&self) -> bool {
        match self {
            CareError::InvalidValue(_) => true,
            CareError::Store(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}
