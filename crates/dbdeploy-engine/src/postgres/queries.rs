use std::collections::HashMap;

use sqlx::{PgConnection, Row};

use dbdeploy_core::ledger::{APPLIED, OBJECT_NAME, OBJECT_TYPE, SCHEMA_NAME, VERSION, VERSION_HISTORY};
use dbdeploy_core::{VersionRow, ledger_key};

pub async fn execute(conn: &mut PgConnection, sql: &str) -> Result<(), sqlx::Error> {
    sqlx::query(sql).execute(conn).await?;
    Ok(())
}

// Unquoted identifiers are folded to lower case by PostgreSQL.
pub async fn table_exists(conn: &mut PgConnection, schema: &str, table: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        select exists (
          select 1
          from information_schema.tables
          where table_schema = lower($1)
            and table_name = lower($2)
        )
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_one(conn)
    .await
}

pub async fn fetch_latest_versions(
    conn: &mut PgConnection,
    admin_schema: &str,
    data_schema: &str,
) -> Result<HashMap<String, i32>, sqlx::Error> {
    let sql = format!(
        "SELECT {SCHEMA_NAME}, {OBJECT_TYPE}, {OBJECT_NAME}, MAX({VERSION}) AS {VERSION} \
         FROM {admin_schema}.{VERSION_HISTORY} \
         WHERE {SCHEMA_NAME} IN ($1, $2) \
         GROUP BY {SCHEMA_NAME}, {OBJECT_TYPE}, {OBJECT_NAME}"
    );
    let rows = sqlx::query(&sql)
        .bind(admin_schema)
        .bind(data_schema)
        .fetch_all(conn)
        .await?;

    let mut versions = HashMap::with_capacity(rows.len());
    for row in rows {
        let schema: String = row.try_get(0)?;
        let object_type: String = row.try_get(1)?;
        let name: String = row.try_get(2)?;
        let version: i32 = row.try_get(3)?;
        let key = match object_type.parse() {
            Ok(object_type) => ledger_key(&schema, object_type, &name),
            Err(_) => format!("{schema}:{object_type}:{name}"),
        };
        versions.insert(key, version);
    }
    Ok(versions)
}

pub async fn insert_version(
    conn: &mut PgConnection,
    admin_schema: &str,
    row: &VersionRow,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT INTO {admin_schema}.{VERSION_HISTORY} \
         ({SCHEMA_NAME}, {OBJECT_TYPE}, {OBJECT_NAME}, {VERSION}, {APPLIED}) \
         VALUES ($1, $2, $3, $4, $5)"
    );
    sqlx::query(&sql)
        .bind(&row.schema_name)
        .bind(row.object_type.as_str())
        .bind(&row.object_name)
        .bind(row.version)
        .bind(row.applied.naive_utc())
        .execute(conn)
        .await?;
    Ok(())
}
