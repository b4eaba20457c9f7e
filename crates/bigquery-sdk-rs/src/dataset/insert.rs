use bigquery_model_rs::TableReference;
use bigquery_model_rs::table_data::{TableDataInsertAllRequest, TableDataInsertAllResponse};

use crate::Client;
use crate::table::{Table, TableUpdater};

/// Streams `request` into `table`. If the table doesn't exist, it's created
/// with `configure` and the same request is sent exactly once more.
///
/// Both waits come from the client's
/// [`AutocreatePolicy`](crate::config::AutocreatePolicy): a random backoff
/// before the create and a fixed propagation delay after it. Losing the
/// create to another writer is not an error.
pub(crate) async fn insert_autocreate<F>(
    client: &Client,
    table: &TableReference,
    request: TableDataInsertAllRequest,
    configure: F,
) -> crate::Result<TableDataInsertAllResponse>
where
    F: FnOnce(&mut TableUpdater),
{
    match client
        .service()
        .insert_table_data(table, request.clone())
        .await
    {
        Err(error) if error.is_not_found() => (),
        result => return result,
    }

    let policy = client.config().autocreate;
    let backoff = policy.initial_backoff();
    info!(message = "table not found, creating it", %table, ?backoff);
    tokio::time::sleep(backoff).await;

    match Table::create(client.clone(), table.clone(), configure).await {
        Ok(_) => (),
        Err(error) if error.is_already_exists() => {
            debug!(message = "table was created concurrently", %table);
        }
        Err(error) => return Err(error),
    }

    info!(
        message = "retrying insert into created table",
        %table,
        delay = ?policy.propagation_delay,
    );
    tokio::time::sleep(policy.propagation_delay).await;

    client.service().insert_table_data(table, request).await
}
