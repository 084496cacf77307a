use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;

use super::error::{MongoDaoError, MongoResult};

const PING_ATTEMPTS: u32 = 10;
const PING_DELAY_FLOOR: Duration = Duration::from_millis(250);
const PING_DELAY_CEILING: Duration = Duration::from_secs(5);

/// Build a client and verify the deployment answers a ping before handing
/// the database out. Transient startup races (container orchestration, DNS)
/// are absorbed by retrying with doubling delays.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut delay = PING_DELAY_FLOOR;
    let mut attempts = 0;
    loop {
        let err = match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => break,
            Err(err) => err,
        };
        attempts += 1;
        if attempts >= PING_ATTEMPTS {
            return Err(MongoDaoError::InitialPing {
                attempts,
                source: err,
            });
        }
        sleep(delay).await;
        delay = (delay * 2).min(PING_DELAY_CEILING);
    }

    Ok((client, database))
}
