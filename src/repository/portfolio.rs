use serde_json::{Map, Value};
use sqlx::{Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    repository::table_service::{list_all_rows, map_db_error, read_rows, MAX_LIST_LIMIT},
    services::records::{Expense, PortfolioSnapshot, Reservation, Unit},
};

/// Optional equality filters for the buildings rollup. Each variant binds
/// its own value; nothing is spliced into the SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildingFilter {
    LocationId(i64),
    PropertyType(String),
}

impl BuildingFilter {
    /// Reads the raw query parameters. Blank values are ignored; a
    /// non-numeric `location_id` is a client error.
    pub fn from_params(
        location_id: Option<&str>,
        property_type: Option<&str>,
    ) -> AppResult<Vec<Self>> {
        let mut clauses = Vec::new();
        if let Some(raw) = location_id.map(str::trim).filter(|raw| !raw.is_empty()) {
            let parsed = raw.parse::<i64>().map_err(|_| {
                AppError::BadRequest(format!("location_id must be an integer, got '{raw}'."))
            })?;
            clauses.push(Self::LocationId(parsed));
        }
        if let Some(kind) = property_type.map(str::trim).filter(|kind| !kind.is_empty()) {
            clauses.push(Self::PropertyType(kind.to_string()));
        }
        Ok(clauses)
    }

    fn push(&self, query: &mut QueryBuilder<'static, Postgres>) {
        match self {
            Self::LocationId(id) => {
                query.push(" AND t.location_id = ").push_bind(*id);
            }
            Self::PropertyType(kind) => {
                query
                    .push(" AND lower(t.property_type) = lower(")
                    .push_bind(kind.clone())
                    .push(")");
            }
        }
    }
}

fn units_query(clauses: &[BuildingFilter], offset: i64) -> QueryBuilder<'static, Postgres> {
    let mut query =
        QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM properties t WHERE 1=1");
    for clause in clauses {
        clause.push(&mut query);
    }
    query.push(" ORDER BY t.id ASC LIMIT ");
    query.push_bind(MAX_LIST_LIMIT);
    if offset > 0 {
        query.push(" OFFSET ").push_bind(offset);
    }
    query
}

pub async fn load_units(pool: &sqlx::PgPool, clauses: &[BuildingFilter]) -> AppResult<Vec<Unit>> {
    let mut units = Vec::new();
    let mut offset = 0;
    loop {
        let rows = units_query(clauses, offset)
            .build()
            .fetch_all(pool)
            .await
            .map_err(map_db_error)?;
        let fetched = rows.len() as i64;
        units.extend(read_rows(rows).iter().filter_map(Unit::from_row));
        if fetched < MAX_LIST_LIMIT {
            return Ok(units);
        }
        offset += fetched;
    }
}

pub async fn load_reservations(
    pool: &sqlx::PgPool,
    filters: Option<&Map<String, Value>>,
) -> AppResult<Vec<Reservation>> {
    let rows = list_all_rows(pool, "reservations", filters, "check_in", false).await?;
    Ok(rows.iter().filter_map(Reservation::from_row).collect())
}

pub async fn load_expenses(
    pool: &sqlx::PgPool,
    filters: Option<&Map<String, Value>>,
) -> AppResult<Vec<Expense>> {
    let rows = list_all_rows(pool, "expenses", filters, "expense_date", false).await?;
    Ok(rows.iter().filter_map(Expense::from_row).collect())
}

/// Reads the three source tables concurrently into one consistent input for
/// the aggregation functions.
pub async fn load_snapshot(pool: &sqlx::PgPool) -> AppResult<PortfolioSnapshot> {
    let (units, reservations, expenses) = tokio::try_join!(
        load_units(pool, &[]),
        load_reservations(pool, None),
        load_expenses(pool, None),
    )?;
    tracing::debug!(
        units = units.len(),
        reservations = reservations.len(),
        expenses = expenses.len(),
        "Loaded portfolio snapshot"
    );
    Ok(PortfolioSnapshot {
        units,
        reservations,
        expenses,
    })
}

#[cfg(test)]
mod tests {
    use super::{units_query, BuildingFilter};
    use crate::error::AppError;

    #[test]
    fn parses_optional_params() {
        let clauses = BuildingFilter::from_params(Some(" 3 "), Some("Villa")).expect("clauses");
        assert_eq!(
            clauses,
            vec![
                BuildingFilter::LocationId(3),
                BuildingFilter::PropertyType("Villa".to_string())
            ]
        );
        assert!(BuildingFilter::from_params(Some(""), None)
            .expect("clauses")
            .is_empty());
        assert!(matches!(
            BuildingFilter::from_params(Some("kololi"), None),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn clauses_bind_in_order() {
        let query = units_query(
            &[
                BuildingFilter::LocationId(3),
                BuildingFilter::PropertyType("villa".to_string()),
            ],
            0,
        );
        assert_eq!(
            query.sql(),
            "SELECT row_to_json(t) AS row FROM properties t WHERE 1=1 \
             AND t.location_id = $1 AND lower(t.property_type) = lower($2) \
             ORDER BY t.id ASC LIMIT $3"
        );
    }

    #[test]
    fn no_clauses_lists_everything() {
        let query = units_query(&[], 0);
        assert!(query.sql().contains("WHERE 1=1 ORDER BY"));
    }

    #[test]
    fn later_unit_pages_bind_an_offset() {
        let query = units_query(&[BuildingFilter::LocationId(3)], 10_000);
        assert!(query
            .sql()
            .ends_with("ORDER BY t.id ASC LIMIT $2 OFFSET $3"));
    }
}
