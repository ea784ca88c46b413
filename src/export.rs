use std::fs::File;
use std::io::Write;
use std::path::Path;

use error_stack::{Report, ResultExt};

use crate::error::ExportError;
use crate::model::Candle;

const HEADER: [&str; 6] = ["open_time", "open", "high", "low", "close", "volume"];

/// Write candles as CSV with an `open_time,open,high,low,close,volume` header.
///
/// Timestamps are RFC 3339. Returns the number of data rows written.
pub fn write_candles<W: Write>(writer: W, candles: &[Candle]) -> Result<usize, Report<ExportError>> {
    let mut writer = csv::Writer::from_writer(writer);
    writer
        .write_record(HEADER)
        .change_context(ExportError::Write)?;

    for candle in candles {
        writer
            .write_record([
                candle.open_time.to_rfc3339(),
                candle.open.to_string(),
                candle.high.to_string(),
                candle.low.to_string(),
                candle.close.to_string(),
                candle.volume.to_string(),
            ])
            .change_context(ExportError::Write)
            .attach_with(|| format!("open_time: {}", candle.open_time))?;
    }

    writer.flush().change_context(ExportError::Write)?;
    Ok(candles.len())
}

/// [`write_candles`] into a newly created file at `path`.
pub fn export_candles(path: &Path, candles: &[Candle]) -> Result<usize, Report<ExportError>> {
    let file = File::create(path)
        .change_context(ExportError::Write)
        .attach_with(|| format!("path: {}", path.display()))?;
    write_candles(file, candles)
}
