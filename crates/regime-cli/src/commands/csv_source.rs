//! A local-file `BarSource`: reads one CSV per symbol from a configured
//! directory. Columns: `ts,open,high,low,close,volume` with an RFC 3339
//! timestamp. No network access — fetching from an external vendor is out
//! of scope here; this just gets a symbol's bars off disk so the pipeline
//! has something to run against.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use regime_core::bar::Bar;
use regime_core::data::{BarHealth, BarSource, FetchRequest, ProviderError};

pub struct CsvBarSource {
    pub dir: PathBuf,
}

impl CsvBarSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, request: &FetchRequest) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", request.symbol, request.bar_size))
    }
}

impl BarSource for CsvBarSource {
    fn fetch(&self, request: &FetchRequest) -> Result<BarHealth, ProviderError> {
        let path = self.path_for(request);
        let contents = fs::read_to_string(&path).map_err(|e| ProviderError::IoError {
            message: format!("{}: {e}", path.display()),
        })?;

        let mut bars = Vec::new();
        for (i, line) in contents.lines().enumerate() {
            if i == 0 && line.starts_with("ts,") {
                continue; // header
            }
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < 6 {
                return Err(ProviderError::ParseError {
                    message: format!("line {}: expected 6 columns, found {}", i + 1, fields.len()),
                });
            }
            let ts: DateTime<Utc> = fields[0].parse().map_err(|_| ProviderError::ParseError {
                message: format!("line {}: invalid timestamp {:?}", i + 1, fields[0]),
            })?;
            let parse_f = |s: &str| -> Result<f64, ProviderError> {
                s.parse().map_err(|_| ProviderError::ParseError {
                    message: format!("invalid numeric field {s:?}"),
                })
            };
            bars.push(Bar::new(
                ts,
                parse_f(fields[1])?,
                parse_f(fields[2])?,
                parse_f(fields[3])?,
                parse_f(fields[4])?,
                parse_f(fields[5])?,
                request.symbol.clone(),
                request.bar_size.clone(),
            ));
        }

        if bars.is_empty() {
            return Ok(BarHealth::failed("no bars parsed from CSV file"));
        }
        Ok(BarHealth::fresh(bars))
    }
}
