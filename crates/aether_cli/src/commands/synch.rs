//! Synch command implementation.

use aether_client::Client;

/// Prints the server's global sequence once everything queued is applied.
pub fn run(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::connect(url)?;
    let global = client.synch()?;
    println!("{global}");
    client.disconnect()?;
    Ok(())
}
