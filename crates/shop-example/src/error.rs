/// Business rule failures raised by shop methods.
///
/// Returning one of these from a method under `dbop` rolls the
/// transaction back.
#[derive(Debug, thiserror::Error)]
pub enum ShopError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("{entity} '{key}' already exists with id {id}")]
    Duplicate {
        entity: &'static str,
        key: String,
        id: u64,
    },

    #[error("cannot remove {entity} {id}: {count} {dependents} reference it")]
    InUse {
        entity: &'static str,
        id: u64,
        count: usize,
        dependents: &'static str,
    },
}
