//! `check` command: verify the token can reach the database and that the
//! database has the properties the importer writes.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::notion::{
    NotionClient, PROP_COLOR, PROP_CREATED, PROP_IMPORT_HASH, PROP_MODIFIED, PROP_NAME,
};

/// Property name and the Notion type it must have.
const REQUIRED_PROPERTIES: [(&str, &str); 5] = [
    (PROP_NAME, "title"),
    (PROP_CREATED, "date"),
    (PROP_MODIFIED, "date"),
    (PROP_COLOR, "rich_text"),
    (PROP_IMPORT_HASH, "rich_text"),
];

pub async fn run_check(client: &NotionClient) -> Result<()> {
    let database = match client.retrieve_database().await {
        Ok(database) => database,
        Err(e) => {
            println!("ERROR: Failed to connect to Notion database");
            println!("Database ID: {}", client.database_id());
            println!("Error: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("1. Verify the NOTION_DB_ID is correct");
            println!("2. Ensure your Notion integration has access to this database");
            println!("3. Check that the database is shared with your integration");
            bail!("Notion connection failed");
        }
    };

    let problems = schema_problems(&database);
    if !problems.is_empty() {
        println!("ERROR: Database schema does not match");
        for problem in &problems {
            println!("  - {}", problem);
        }
        bail!("{} schema problem(s)", problems.len());
    }

    println!("OK: Notion connection verified.");
    Ok(())
}

/// Missing or mistyped properties, one message each.
pub fn schema_problems(database: &Value) -> Vec<String> {
    let properties = database.get("properties");
    REQUIRED_PROPERTIES
        .iter()
        .filter_map(|(name, expected)| {
            let actual = properties
                .and_then(|p| p.get(*name))
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str);
            match actual {
                None => Some(format!("missing property '{}' ({})", name, expected)),
                Some(t) if t != *expected => Some(format!(
                    "property '{}' is {} but must be {}",
                    name, t, expected
                )),
                Some(_) => None,
            }
        })
        .collect()
}
