// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `attache doctor`: configuration and storage health check.

use attache_config::{load_config, validate_config};
use attache_core::AttacheError;
use attache_storage::queries::{contacts, messages, queue, report_queue};
use attache_storage::Database;

/// Loads and validates config, opens the database, and prints a short
/// health summary.
pub async fn run_doctor() -> Result<(), AttacheError> {
    let config = load_config().map_err(|e| AttacheError::Config(e.to_string()))?;
    println!("config: ok (agent '{}')", config.agent.name);

    match validate_config(&config) {
        Ok(()) => println!("validation: ok"),
        Err(e) => {
            println!("validation: FAILED\n  {e}");
            return Err(e);
        }
    }

    let keys = config.llm.key_pool();
    println!("model keys: {} configured", keys.len());
    println!(
        "owner: {}",
        config.owner.address.as_deref().unwrap_or("(not configured)")
    );
    println!(
        "telegram: {}",
        if config.telegram.bot_token.is_some() {
            "configured"
        } else {
            "disabled"
        }
    );

    let db = Database::open_with(&config.storage).await?;
    println!("storage: ok ({})", config.storage.database_path);
    println!("  contacts:        {}", contacts::count(&db).await?);
    println!("  messages logged: {}", messages::count(&db).await?);
    println!("  queue depth:     {}", queue::depth(&db).await?);
    println!("  pending reports: {}", report_queue::pending_count(&db).await?);
    db.close().await?;

    Ok(())
}
