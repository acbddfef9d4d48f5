use log::{error, warn};
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use postgres_openssl::MakeTlsConnector;
use tokio::time::Duration;
use url::Url;

const MAX_RETRIES: usize = 5;
const WAIT_BETWEEN_RETRIES: u64 = 5;

pub fn create_ssl_connector(sslrootcert_path: &str) -> Result<MakeTlsConnector, String> {
    let mut builder =
        SslConnector::builder(SslMethod::tls()).map_err(|e| format!("SSL builder error: {}", e))?;

    builder
        .set_ca_file(sslrootcert_path)
        .map_err(|e| format!("Error loading CA cert: {}", e))?;

    builder.set_verify(SslVerifyMode::PEER);

    Ok(MakeTlsConnector::new(builder.build()))
}

/// Split the `sslrootcert` query parameter off a connection URL
///
/// tokio-postgres rejects unknown parameters, so the CA path is taken out and
/// the remaining query is kept in its original order.
///
/// # Returns
/// (connection URL without sslrootcert, CA certificate path)
pub fn split_sslrootcert(database_url: &str) -> Result<(String, String), String> {
    let url = Url::parse(database_url).map_err(|e| format!("URL parse error: {}", e))?;

    let mut sslrootcert_path = None;
    let mut clean_params = Vec::new();
    for (key, value) in url.query_pairs() {
        if key == "sslrootcert" {
            sslrootcert_path = Some(value.to_string());
        } else {
            clean_params.push((key.into_owned(), value.into_owned()));
        }
    }

    let sslrootcert_path = sslrootcert_path.ok_or("sslrootcert parameter missing")?;

    let mut clean_url = url.clone();
    clean_url.set_query(None);
    if !clean_params.is_empty() {
        let query = clean_params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        clean_url.set_query(Some(&query));
    }

    Ok((clean_url.to_string(), sslrootcert_path))
}

pub async fn execute_with_retry<F, Fut>(database_url: &str, operation: F) -> Result<(), String>
where
    F: Fn(tokio_postgres::Client) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<u64, tokio_postgres::Error>> + Send,
{
    // A malformed URL will not get better by retrying
    let (clean_database_url, sslrootcert_path) = split_sslrootcert(database_url)?;

    for attempt in 0..MAX_RETRIES {
        let connector = match create_ssl_connector(&sslrootcert_path) {
            Ok(c) => c,
            Err(e) => {
                error!("Attempt {}: SSL connector error: {}", attempt + 1, e);
                continue;
            }
        };

        match tokio_postgres::connect(&clean_database_url, connector).await {
            Ok((client, connection)) => {
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("Connection error: {}", e);
                    }
                });

                match operation(client).await {
                    Ok(_) => return Ok(()),
                    Err(e) => error!("Attempt {}: Query error: {}", attempt + 1, e),
                }
            }
            Err(e) => error!("Attempt {}: Connection error: {}", attempt + 1, e),
        }

        if attempt < MAX_RETRIES - 1 {
            warn!("Retrying in {} seconds", WAIT_BETWEEN_RETRIES);
            tokio::time::sleep(Duration::from_secs(WAIT_BETWEEN_RETRIES)).await;
        }
    }

    Err("Max retries exceeded".into())
}
