/// Database operations for exported fan metrics
use crate::database::connection::execute_with_retry;
use crate::metrics::MetricsRow;

/// Store one averaged data point in the dewpoint_metrics table
///
/// Uses the retry mechanism to ride out transient connection problems.
///
/// # Arguments
/// * `row` - Averaged inside/outside values and the venting flag
/// * `database_url` - PostgreSQL connection string
///
/// # Returns
/// Result indicating success or failure
pub async fn store_metrics(row: &MetricsRow, database_url: &str) -> Result<(), String> {
    // Clone data for move into async closure
    let row = row.clone();

    execute_with_retry(database_url, move |client| {
        let row = row.clone();
        async move {
            client
                .execute(
                    "INSERT INTO dewpoint_metrics(time, temp_i, temp_o, dewpoint_i, dewpoint_o, hum_i, hum_o, vent_val)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                    &[
                        &row.time,
                        &row.temp_i,
                        &row.temp_o,
                        &row.dewpoint_i,
                        &row.dewpoint_o,
                        &row.hum_i,
                        &row.hum_o,
                        &row.vent_val,
                    ],
                )
                .await
        }
    })
    .await
}
