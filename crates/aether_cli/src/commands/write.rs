//! Assign and clear command implementations.

use aether_client::{Client, ClientConfig};
use aether_protocol::AetherUrl;
use aether_tree::Value;

fn finish(client: &Client, global: u64, wait: bool) -> Result<(), Box<dyn std::error::Error>> {
    if wait {
        client.synch_to(global)?;
    }
    println!("{global}");
    client.disconnect()?;
    Ok(())
}

/// Replaces the subtree at the URL's dimension.
pub fn assign(url: &str, value: Value, wait: bool) -> Result<(), Box<dyn std::error::Error>> {
    let url = AetherUrl::parse(url)?;
    let client = Client::connect_with(&url, ClientConfig::default())?;
    let global = client.assign(&url.dimension, value)?;
    finish(&client, global, wait)
}

/// Clears the subtree at the URL's dimension.
pub fn clear(url: &str, wait: bool) -> Result<(), Box<dyn std::error::Error>> {
    let url = AetherUrl::parse(url)?;
    let client = Client::connect_with(&url, ClientConfig::default())?;
    let global = client.clear(&url.dimension)?;
    finish(&client, global, wait)
}
