use anyhow::{Context, Result};
use geolocations::{AccessMode, DataValue, Decode, InjectableValues, Location, Reader, LOCALES};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::cli_utils::open_reader;

fn lookup_as<T: Decode + Serialize>(
    reader: &Reader,
    address: &str,
    injectables: &InjectableValues,
) -> Result<(bool, Value)> {
    let ip: IpAddr = address
        .trim()
        .parse()
        .with_context(|| format!("'{}' is not an IPv4 or IPv6 address", address))?;
    let result = reader.lookup_with::<T>(ip, injectables)?;
    Ok((
        result.found,
        json!({
            "ip": address,
            "found": result.found,
            "network": result.network.to_string(),
            "prefix_len": result.prefix_len(),
            "data": serde_json::to_value(&result.data)?,
        }),
    ))
}

pub fn cmd_lookup(
    database: PathBuf,
    addresses: Vec<String>,
    mode: AccessMode,
    locales: Vec<String>,
    raw: bool,
    quiet: bool,
) -> Result<()> {
    let reader = open_reader(&database, mode)?;

    let mut injectables = InjectableValues::new();
    if !locales.is_empty() {
        injectables.add_value(LOCALES, locales);
    }

    // Reader is Sync; collect keeps input order
    let results: Vec<(bool, Value)> = addresses
        .par_iter()
        .map(|address| {
            let result = if raw {
                lookup_as::<DataValue>(&reader, address, &injectables)
            } else {
                lookup_as::<Location>(&reader, address, &injectables)
            };
            result.unwrap_or_else(|e| {
                log::debug!("lookup of {} failed: {:#}", address, e);
                (false, json!({ "ip": address, "error": format!("{:#}", e) }))
            })
        })
        .collect();
    let all_found = results.iter().all(|(found, _)| *found);

    if quiet {
        std::process::exit(if all_found { 0 } else { 1 });
    }

    let output: Vec<Value> = results.into_iter().map(|(_, value)| value).collect();
    println!("{}", serde_json::to_string_pretty(&output)?);
    reader.close();
    Ok(())
}
