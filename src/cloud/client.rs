use std::sync::{Arc, OnceLock};

use anyhow::Result;
use log::{debug, warn};
use rusoto_core::Region;
use rusoto_s3::S3Client;

/// Process-wide client, initialized once at startup and only borrowed afterwards.
static SHARED_CLIENT: OnceLock<Arc<S3Client>> = OnceLock::new();

/// Parse a region name, falling back to the default provider chain.
pub fn parse_region(region_name: Option<&str>) -> Region {
    match region_name {
        Some(name) => match name.parse::<Region>() {
            Ok(r) => r,
            Err(_) => {
                warn!("Invalid region '{}', using default", name);
                Region::default()
            }
        },
        None => Region::default(),
    }
}

/// Create an S3 client with the specified region and profile
pub fn create_s3_client(region_name: Option<&str>, profile: Option<&str>) -> Result<Arc<S3Client>> {
    let region = parse_region(region_name);

    // Create S3 client with profile if specified
    let s3_client = if let Some(profile_name) = profile {
        match rusoto_credential::ProfileProvider::new() {
            Ok(mut provider) => {
                provider.set_profile(profile_name);
                match rusoto_core::HttpClient::new() {
                    Ok(http_client) => {
                        Arc::new(S3Client::new_with(http_client, provider, region.clone()))
                    }
                    Err(e) => {
                        warn!("Failed to create HTTP client: {}, using default", e);
                        Arc::new(S3Client::new(region.clone()))
                    }
                }
            }
            Err(e) => {
                warn!("Failed to create AWS profile provider: {}, using default", e);
                Arc::new(S3Client::new(region.clone()))
            }
        }
    } else {
        Arc::new(S3Client::new(region.clone()))
    };

    debug!("Created S3 client for region {}", region.name());
    Ok(s3_client)
}

/// Initialize the process-wide client. Later calls return the first client.
pub fn init_shared_client(
    region_name: Option<&str>,
    profile: Option<&str>,
) -> Result<Arc<S3Client>> {
    if let Some(client) = SHARED_CLIENT.get() {
        return Ok(Arc::clone(client));
    }
    let client = create_s3_client(region_name, profile)?;
    Ok(Arc::clone(SHARED_CLIENT.get_or_init(|| client)))
}
