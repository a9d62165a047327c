use {crate::domain::error::StoreError, sqlx::PgPool};

/// Claims a conversion report for its dedup key. The first caller wins;
/// everyone else sees false.
pub async fn claim_conversion(
    pool: &PgPool,
    event_type: &str,
    entity_type: &str,
    entity_id: &str,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO conversion_claims (event_type, entity_type, entity_id)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(event_type)
    .bind(entity_type)
    .bind(entity_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
