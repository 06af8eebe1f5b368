use sqlx::PgPool;

/// Postgres handle that entity queries and the storage traits run against.
#[derive(Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
