use anyhow::Result;
use geolocations::AccessMode;
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::{format_bytes, format_number, format_unix_timestamp, open_reader};

pub fn cmd_inspect(database: PathBuf, json_output: bool) -> Result<()> {
    let reader = open_reader(&database, AccessMode::MemoryMapped)?;
    let metadata = reader.metadata();
    let file_size = reader.buffer().len();

    if json_output {
        let output = json!({
            "file": database.display().to_string(),
            "file_size": file_size,
            "search_tree_size": metadata.search_tree_size(),
            "metadata": metadata,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Database:       {}", database.display());
        println!("Type:           {}", metadata.database_type);
        println!(
            "Format:         MMDB v{}.{}",
            metadata.binary_format_major_version, metadata.binary_format_minor_version
        );
        println!("IP version:     IPv{}", metadata.ip_version.number());
        println!("Record size:    {} bits", metadata.record_size.bits());
        println!("Nodes:          {}", format_number(metadata.node_count as usize));
        println!("Search tree:    {}", format_bytes(metadata.search_tree_size()));
        println!("File size:      {}", format_bytes(file_size));
        println!("Built:          {}", format_unix_timestamp(metadata.build_epoch));
        if !metadata.languages.is_empty() {
            println!("Languages:      {}", metadata.languages.join(", "));
        }
        if !metadata.description.is_empty() {
            println!();
            println!("Description:");
            for (locale, text) in &metadata.description {
                println!("  {:<6} {}", locale, text);
            }
        }
    }
    Ok(())
}
