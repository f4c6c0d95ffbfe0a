use anyhow::{Context, Result};
use geolocations::{AccessMode, FindAllOptions, Location};
use serde_json::json;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use crate::cli_utils::{format_number, open_reader};
use crate::ExportFormat;

enum Output {
    Csv(csv::Writer<BufWriter<Box<dyn Write>>>),
    Json(BufWriter<Box<dyn Write>>),
}

pub fn cmd_export(
    database: PathBuf,
    format: ExportFormat,
    cache_size: usize,
    include_aliases: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let reader = open_reader(&database, AccessMode::MemoryMapped)?;

    let sink: Box<dyn Write> = match &output {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let writer = BufWriter::new(sink);
    let mut out = match format {
        ExportFormat::Csv => {
            let mut w = csv::Writer::from_writer(writer);
            w.write_record(["network", "prefix_len", "country", "city", "latitude", "longitude"])?;
            Output::Csv(w)
        }
        ExportFormat::Json => Output::Json(writer),
    };

    let options = FindAllOptions {
        cache_size,
        skip_aliased_networks: !include_aliases,
    };
    let start = Instant::now();
    let mut count = 0usize;
    let mut records = reader.find_all::<Location>(options, None);

    for record in records.by_ref() {
        let record = record.with_context(|| format!("Export failed after {} networks", count))?;
        let location: &Location = &record.data;
        match &mut out {
            Output::Csv(w) => {
                let coord = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
                w.write_record([
                    record.network.to_string(),
                    record.prefix_len().to_string(),
                    location.country.iso_code.clone().unwrap_or_default(),
                    location.city.name("en").unwrap_or_default().to_string(),
                    coord(location.location.latitude),
                    coord(location.location.longitude),
                ])?;
            }
            Output::Json(w) => {
                let line = json!({
                    "network": record.network,
                    "prefix_len": record.prefix_len(),
                    "data": location,
                });
                serde_json::to_writer(&mut *w, &line)?;
                w.write_all(b"\n")?;
            }
        }
        count += 1;
    }

    match &mut out {
        Output::Csv(w) => w.flush()?,
        Output::Json(w) => w.flush()?,
    }

    let (hits, misses) = records.cache_stats();
    log::info!(
        "exported {} networks in {:.2?} (decode cache: {} hits, {} misses)",
        format_number(count),
        start.elapsed(),
        hits,
        misses
    );
    Ok(())
}
