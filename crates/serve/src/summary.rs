//! Dataset-wide aggregates for the summary endpoint.

use crate::db::{Result, ToxStore, TABLE};
use domain::column::Column;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ClassCount {
    pub class: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total_rows: i64,
    pub total_unique_chemicals: i64,
    /// Row counts per chemical class, blank/NULL classes excluded,
    /// largest class first.
    pub class_counts: Vec<ClassCount>,
}

impl ToxStore {
    #[tracing::instrument(skip_all)]
    pub async fn summary(&self) -> Result<Summary> {
        let total_rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {TABLE}"))
            .fetch_one(self.pool())
            .await?;

        let chem = Column::ChemicalName.as_str();
        let total_unique_chemicals: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(DISTINCT {chem}) FROM {TABLE}"))
                .fetch_one(self.pool())
                .await?;

        let class = Column::ClassOfChemical.as_str();
        let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
            "SELECT {class}, COUNT(*) AS n FROM {TABLE} \
             WHERE {class} IS NOT NULL AND TRIM({class}) != '' \
             GROUP BY {class} ORDER BY n DESC"
        ))
        .fetch_all(self.pool())
        .await?;

        let class_counts = rows
            .into_iter()
            .map(|(class, count)| ClassCount { class, count })
            .collect();

        Ok(Summary {
            total_rows,
            total_unique_chemicals,
            class_counts,
        })
    }
}
